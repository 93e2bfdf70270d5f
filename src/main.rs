use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Table, presets::UTF8_FULL};

use hostkit::{
    AddRepositoryOptions, Capability, InstallOptions, LocalShell, RepositoryInfo, classify,
};

/// Hostkit: OS detection and package management for the local machine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Never elevate with sudo, even for operations that want it
    #[arg(long, global = true)]
    no_sudo: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect which OS variant this machine runs
    Detect,
    /// Show distro identity information
    Info {
        #[arg(long)]
        json: bool,
    },
    /// Show kernel identity information
    Kernel {
        #[arg(long)]
        json: bool,
    },
    /// Install packages with the native package manager
    Install {
        packages: Vec<String>,
        /// Skip signature verification
        #[arg(long)]
        unsigned: bool,
    },
    /// Upgrade packages (all of them when none are given)
    Update { packages: Vec<String> },
    /// Check whether a package is installed
    Exists { package: String },
    /// Check whether a package is available in the repositories
    InRepo { package: String },
    /// Show the installed version of a package
    Version {
        package: String,
        /// Query the package manager even when a cached result exists
        #[arg(long)]
        no_cache: bool,
    },
    /// List configured package repositories
    Repos {
        #[arg(long)]
        json: bool,
    },
    /// Register an extra package repository
    AddRepo {
        repo: String,
        /// Repository alias (required by zypper)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Capture a diagnostic snapshot into a directory
    Capture { directory: Option<PathBuf> },
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), error);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let shell = if cli.no_sudo {
        LocalShell::without_sudo()
    } else {
        LocalShell::new()
    };
    let mut os = classify(Box::new(shell)).context("failed to classify this machine")?;

    match cli.command {
        Commands::Detect => {
            println!("{} {}", "detected:".green().bold(), os.name());
        }
        Commands::Info { json } => {
            let information = os.information().context("failed to read os information")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&information)?);
            } else {
                println!("{}: {}", "vendor".bold(), information.vendor);
                println!("{}: {}", "release".bold(), information.release);
                println!("{}: {}", "version".bold(), information.version);
                if !information.codename.is_empty() {
                    println!("{}: {}", "codename".bold(), information.codename);
                }
                println!("{}: {}", "full version".bold(), information.full_version);
            }
        }
        Commands::Kernel { json } => {
            let kernel = os
                .kernel_information()
                .context("failed to read kernel information")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kernel)?);
            } else {
                println!("{}: {}", "kernel".bold(), kernel.raw_version);
                println!("{}: {}", "version".bold(), kernel.version);
                println!("{}: {}", "platform".bold(), kernel.hardware_platform);
                println!("{}: {}", "os".bold(), kernel.operating_system);
            }
        }
        Commands::Install { packages, unsigned } => {
            anyhow::ensure!(!packages.is_empty(), "no packages given");
            let mut options = InstallOptions::new();
            if unsigned {
                options = options.unsigned();
            }
            let refs: Vec<&str> = packages.iter().map(String::as_str).collect();
            os.install_packages(&refs, options)
                .with_context(|| format!("failed to install {}", packages.join(" ")))?;
            println!("{} installed {}", "ok".green().bold(), packages.join(" "));
        }
        Commands::Update { packages } => {
            let refs: Vec<&str> = packages.iter().map(String::as_str).collect();
            os.update_packages(&refs)
                .context("failed to update packages")?;
            println!("{} packages updated", "ok".green().bold());
        }
        Commands::Exists { package } => {
            let exists = os
                .package_exists(package.as_str())
                .with_context(|| format!("failed to query {}", package))?;
            if exists {
                println!("{} {} is installed", "yes".green().bold(), package);
            } else {
                println!("{} {} is not installed", "no".yellow().bold(), package);
                std::process::exit(1);
            }
        }
        Commands::InRepo { package } => {
            let available = os
                .is_package_in_repo(package.as_str())
                .with_context(|| format!("failed to query {}", package))?;
            if available {
                println!("{} {} is available", "yes".green().bold(), package);
            } else {
                println!(
                    "{} {} is not in any repository",
                    "no".yellow().bold(),
                    package
                );
                std::process::exit(1);
            }
        }
        Commands::Version { package, no_cache } => {
            let version = os
                .package_information(&package, !no_cache)
                .with_context(|| format!("failed to read version of {}", package))?;
            println!("{} {}", package.bold(), version);
        }
        Commands::Repos { json } => {
            let repositories = os.repositories().context("failed to list repositories")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&repositories)?);
            } else {
                print_repository_table(&repositories);
            }
        }
        Commands::AddRepo { repo, name } => {
            let options = AddRepositoryOptions {
                repo_name: name,
                ..AddRepositoryOptions::default()
            };
            os.add_repository(&repo, options)
                .with_context(|| format!("failed to add repository {}", repo))?;
            println!("{} repository added", "ok".green().bold());
        }
        Commands::Capture { directory } => {
            anyhow::ensure!(
                os.supports(Capability::CaptureSystemInformation),
                "capture is not supported on {}",
                os.name()
            );
            let directory = directory.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "hostkit-capture-{}",
                    chrono::Local::now().format("%Y%m%d-%H%M%S")
                ))
            });
            let transfer = if cli.no_sudo {
                LocalShell::without_sudo()
            } else {
                LocalShell::new()
            };
            os.capture_system_information(&transfer, &directory)
                .context("failed to capture system information")?;
            println!(
                "{} snapshot written to {}",
                "ok".green().bold(),
                directory.display()
            );
        }
    }

    Ok(())
}

fn print_repository_table(repositories: &[RepositoryInfo]) {
    if repositories.is_empty() {
        println!("no repositories found");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    match repositories[0] {
        RepositoryInfo::Debian { .. } => {
            table.set_header(vec!["Status", "Id", "URI", "Name", "Metadata"]);
            for repo in repositories {
                if let RepositoryInfo::Debian {
                    status,
                    id,
                    uri,
                    name,
                    metadata,
                } = repo
                {
                    table.add_row(vec![status, id, uri, name, metadata]);
                }
            }
        }
        RepositoryInfo::Rpm { .. } => {
            table.set_header(vec!["Id", "Name"]);
            for repo in repositories {
                if let RepositoryInfo::Rpm { id, name } = repo {
                    table.add_row(vec![id, name]);
                }
            }
        }
        RepositoryInfo::Suse { .. } => {
            table.set_header(vec![
                "Id", "Alias", "Name", "Enabled", "GPG Check", "Refresh",
            ]);
            for repo in repositories {
                if let RepositoryInfo::Suse {
                    id,
                    alias,
                    name,
                    enabled,
                    gpg_check,
                    refresh,
                } = repo
                {
                    table.add_row(vec![
                        id.clone(),
                        alias.clone(),
                        name.clone(),
                        enabled.to_string(),
                        gpg_check.to_string(),
                        refresh.to_string(),
                    ]);
                }
            }
        }
    }
    println!("{table}");
}
