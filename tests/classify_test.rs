mod common;

use common::{ScriptedConnection, executed};
use hostkit::{HostError, OsKind, classify};

const UBUNTU_OS_RELEASE: &str = r#"PRETTY_NAME="Ubuntu 20.04.5 LTS"
NAME="Ubuntu"
VERSION_ID="20.04"
VERSION="20.04.5 LTS (Focal Fossa)"
ID=ubuntu
ID_LIKE=debian
"#;

#[test]
fn windows_is_classified_without_probing() {
    let conn = ScriptedConnection::windows();
    let history = conn.history_handle();
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::Windows);
    assert!(history.borrow().is_empty());
}

#[test]
fn ubuntu_from_os_release_name() {
    let conn = ScriptedConnection::posix().on("cat /etc/os-release", 0, UBUNTU_OS_RELEASE);
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::Ubuntu);
}

#[test]
fn lsb_description_wins_and_stops_probing() {
    let conn = ScriptedConnection::posix()
        .on("lsb_release -d", 0, "Description:\tUbuntu 20.04.5 LTS\n")
        .on("cat /etc/os-release", 0, UBUNTU_OS_RELEASE);
    let history = conn.history_handle();
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::Ubuntu);
    // matched on the first probe, so nothing further ran
    assert_eq!(executed(&history, "cat /etc/redhat-release"), 0);
    assert_eq!(executed(&history, "uname"), 0);
}

#[test]
fn centos_from_legacy_redhat_release() {
    let conn = ScriptedConnection::posix().on(
        "cat /etc/redhat-release",
        0,
        "CentOS Linux release 8.3.2011\n",
    );
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::CentOS);
}

#[test]
fn sles_from_lsb_description() {
    let conn = ScriptedConnection::posix().on(
        "lsb_release -d",
        0,
        "Description:\tSUSE Linux Enterprise Server 15\n",
    );
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::SLES);
}

#[test]
fn freebsd_from_uname() {
    let conn = ScriptedConnection::posix().on("uname", 0, "FreeBSD\n");
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::FreeBSD);
}

#[test]
fn derivative_resolves_through_id_like() {
    let os_release = "NAME=\"Sangoma Linux\"\nID=sangoma\nID_LIKE=\"centos rhel fedora\"\nVERSION_ID=\"7\"\n";
    let conn = ScriptedConnection::posix().on("cat /etc/os-release", 0, os_release);
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::CentOS);
}

#[test]
fn no_signal_at_all_is_undetectable() {
    let conn = ScriptedConnection::posix();
    let error = classify(Box::new(conn)).unwrap_err();
    assert!(matches!(error, HostError::UndetectableEnvironment));
}

#[test]
fn unmatched_candidates_are_reported() {
    let conn = ScriptedConnection::posix().on("lsb_release -d", 0, "Description:\tPurpleOS 3.0\n");
    let error = classify(Box::new(conn)).unwrap_err();
    match error {
        HostError::UnknownDistribution { candidates } => {
            assert!(candidates.contains(&"PurpleOS 3.0".to_string()));
        }
        other => panic!("expected UnknownDistribution, got {other:?}"),
    }
}

#[test]
fn probe_failures_do_not_abort_detection() {
    // every early probe errors out, the SuSE-release one still lands
    let conn = ScriptedConnection::posix().on(
        "cat /etc/SuSE-release",
        0,
        "SUSE Linux Enterprise Server 12 (x86_64)\nVERSION = 12\n",
    );
    let os = classify(Box::new(conn)).unwrap();
    assert_eq!(os.kind(), OsKind::Suse);
}
