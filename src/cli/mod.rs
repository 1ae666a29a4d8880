//! Command-line interface.
//!
//! - `serve` (default) - Run the API server
//! - `gen-cert` - Write a self-signed certificate for local HTTPS
//! - `show-config` - Print the effective configuration, secrets redacted

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::tls::{CertificateInfo, SelfSignedCertificate, CERT_FILE_NAME, KEY_FILE_NAME};

#[derive(Parser, Debug)]
#[command(name = "keystone")]
#[command(author, version, about = "HTTPS API service with JWT and passwordless login", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "KEYSTONE_CONFIG", default_value = "keystone.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the API server
    Serve,

    /// Generate a self-signed certificate and key
    GenCert {
        /// Output directory (default: tls.cert_dir)
        #[arg(long)]
        cert_dir: Option<PathBuf>,
        /// Validity in days (default: tls.days_valid)
        #[arg(long)]
        days: Option<u32>,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    ShowConfig,
}

pub fn gen_cert(config: &Config, cert_dir: Option<PathBuf>, days: Option<u32>, force: bool) -> Result<()> {
    let dir = cert_dir.unwrap_or_else(|| config.tls.cert_dir.clone());
    let days = days.unwrap_or(config.tls.days_valid);
    let cert_path = dir.join(CERT_FILE_NAME);
    let key_path = dir.join(KEY_FILE_NAME);

    let written = SelfSignedCertificate::generate(&config.tls.organization, days)?
        .write(&cert_path, &key_path, force)?;

    if written {
        println!("Certificate: {}", cert_path.display());
        println!("Private key: {}", key_path.display());
    } else {
        println!(
            "Certificate files already exist in {} (use --force to overwrite)",
            dir.display()
        );
    }
    println!();
    println!("{}", CertificateInfo::from_pem_file(&cert_path)?);
    Ok(())
}

pub fn show_config(config: &Config) {
    println!("=== Keystone Configuration ===");
    println!();
    for (key, value) in config.summary() {
        println!("{:<32} {}", key, value);
    }
}
