mod common;

use common::{ScriptedConnection, executed};
use hostkit::{HostError, OperatingSystem, OsKind, parse_version};

#[test]
fn windows_information_from_ver_banner() {
    let conn =
        ScriptedConnection::windows().on("ver", 0, "Microsoft Windows [Version 10.0.22000.100]\n");
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::Windows);
    let information = os.information().unwrap();
    assert_eq!(information.vendor, "Microsoft");
    assert_eq!(information.release, "10.0.22000.100");
    assert_eq!(information.full_version, "Microsoft Windows [Version 10.0.22000.100]");
}

#[test]
fn ubuntu_information_from_lsb_release() {
    let conn = ScriptedConnection::posix().on(
        "lsb_release -a",
        0,
        "No LSB modules are available.\nDistributor ID:\tUbuntu\nDescription:\tUbuntu 20.04.5 LTS\nRelease:\t20.04\nCodename:\tfocal\n",
    );
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::Ubuntu);
    let information = os.information().unwrap();
    assert_eq!(information.vendor, "Ubuntu");
    assert_eq!(information.release, "20.04");
    assert_eq!(information.codename, "focal");
    assert_eq!(information.full_version, "Ubuntu 20.04.5 LTS");
}

#[test]
fn debian_point_release_comes_from_debian_version() {
    let conn = ScriptedConnection::posix()
        .on(
            "cat /etc/os-release",
            0,
            "NAME=\"Debian GNU/Linux\"\nVERSION_ID=\"10\"\nVERSION=\"10 (buster)\"\nPRETTY_NAME=\"Debian GNU/Linux 10 (buster)\"\n",
        )
        .on("cat /etc/debian_version", 0, "10.7\n");
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::Debian);
    let information = os.information().unwrap();
    assert_eq!(information.release, "10.7");
    assert_eq!(information.version, parse_version("10.7").unwrap());
    assert_eq!(information.codename, "buster");
}

#[test]
fn redhat_strips_vendor_suffix_from_os_release() {
    let conn = ScriptedConnection::posix().on(
        "cat /etc/os-release",
        0,
        "NAME=\"Red Hat Enterprise Linux\"\nVERSION_ID=\"8.3\"\nVERSION=\"8.3 (Ootpa)\"\nPRETTY_NAME=\"Red Hat Enterprise Linux 8.3 (Ootpa)\"\n",
    );
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::RedHat);
    let information = os.information().unwrap();
    assert_eq!(information.vendor, "Red Hat");
    assert_eq!(information.release, "8.3");
}

#[test]
fn redhat_falls_back_to_legacy_release_file() {
    let conn = ScriptedConnection::posix()
        .on("cat /etc/os-release", 1, "")
        .on(
            "cat /etc/redhat-release",
            0,
            "Red Hat Enterprise Linux Server release 6.9 (Santiago)\n",
        );
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::RedHat);
    let information = os.information().unwrap();
    assert_eq!(information.vendor, "Red Hat");
    assert_eq!(information.release, "6.9");
    assert_eq!(information.codename, "Santiago");
}

#[test]
fn information_is_memoized_per_instance() {
    let conn = ScriptedConnection::posix().on(
        "cat /etc/os-release",
        0,
        "NAME=\"SLES\"\nVERSION_ID=\"15.2\"\nVERSION=\"15-SP2\"\nPRETTY_NAME=\"SUSE Linux Enterprise Server 15 SP2\"\n",
    );
    let history = conn.history_handle();
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::SLES);
    os.information().unwrap();
    os.information().unwrap();
    assert_eq!(executed(&history, "cat /etc/os-release"), 1);
}

#[test]
fn missing_release_fails_instead_of_partial_record() {
    let conn = ScriptedConnection::posix().on(
        "cat /etc/os-release",
        0,
        "NAME=\"Arch Linux\"\nPRETTY_NAME=\"Arch Linux\"\nID=arch\n",
    );
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::OtherLinux);
    assert!(matches!(
        os.information(),
        Err(HostError::IncompleteOsInfo { missing: "release" })
    ));
}

#[test]
fn kernel_information_from_uname() {
    let conn = ScriptedConnection::posix()
        .on("uname -r", 0, "5.15.0-1019-azure\n")
        .on("uname -m", 0, "x86_64\n")
        .on("uname -o", 0, "GNU/Linux\n");
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::Ubuntu);
    let kernel = os.kernel_information().unwrap();
    assert_eq!(kernel.raw_version, "5.15.0-1019-azure");
    assert_eq!(kernel.version.major, 5);
    assert_eq!(kernel.version.minor, 15);
    assert_eq!(kernel.hardware_platform, "x86_64");
    assert_eq!(kernel.operating_system, "GNU/Linux");
    assert_eq!(kernel.version_parts, vec!["5", "15", "0", "1019-azure"]);
}

#[test]
fn redhat_kernel_parts_are_decomposed() {
    let conn = ScriptedConnection::posix()
        .on("uname -r", 0, "4.18.0-305.40.1.el8_4.x86_64\n")
        .on("uname -m", 0, "x86_64\n")
        .on("uname -o", 0, "GNU/Linux\n");
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::CentOS);
    let kernel = os.kernel_information().unwrap();
    assert_eq!(
        kernel.version_parts,
        vec!["4", "18", "0", "305", "40", "1", "el8_4", "x86_64"]
    );
}

#[test]
fn kernel_information_is_posix_only() {
    let conn = ScriptedConnection::windows();
    let mut os = OperatingSystem::new(Box::new(conn), OsKind::Windows);
    assert!(matches!(
        os.kernel_information(),
        Err(HostError::CapabilityNotImplemented { .. })
    ));
}
