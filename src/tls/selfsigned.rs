// Self-signed certificates for local HTTPS

use anyhow::{Context, Result};
use rand::Rng;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, KeyPair, SanType, SerialNumber,
};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use time::OffsetDateTime;
use tracing::info;
use x509_parser::extensions::GeneralName;

pub const COMMON_NAME: &str = "localhost";
pub const DNS_NAMES: &[&str] = &["localhost", "*.localhost"];

/// A freshly generated certificate and its ECDSA P-256 key, PEM encoded
pub struct SelfSignedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

impl SelfSignedCertificate {
    pub fn generate(organization: &str, days_valid: u32) -> Result<Self> {
        let key_pair = KeyPair::generate().context("Failed to generate key pair")?;

        let mut params = CertificateParams::default();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, "DE");
        dn.push(DnType::StateOrProvinceName, "Bavaria");
        dn.push(DnType::LocalityName, "Local");
        dn.push(DnType::OrganizationName, organization);
        dn.push(DnType::CommonName, COMMON_NAME);
        params.distinguished_name = dn;

        params.subject_alt_names = DNS_NAMES
            .iter()
            .map(|name| -> Result<SanType> {
                Ok(SanType::DnsName(
                    name.to_string()
                        .try_into()
                        .with_context(|| format!("Invalid DNS name: {}", name))?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));

        params.serial_number = Some(random_serial());

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(i64::from(days_valid));

        let cert = params
            .self_signed(&key_pair)
            .context("Failed to self-sign certificate")?;

        Ok(Self {
            cert_pem: pem::encode(&pem::Pem::new("CERTIFICATE", cert.der().to_vec())),
            key_pem: pem::encode(&pem::Pem::new("PRIVATE KEY", key_pair.serialize_der())),
        })
    }

    /// Write the pair to disk. Existing files are kept unless `force` is set;
    /// returns whether anything was written.
    pub fn write(&self, cert_path: &Path, key_path: &Path, force: bool) -> Result<bool> {
        if !force && (cert_path.exists() || key_path.exists()) {
            info!(
                cert = %cert_path.display(),
                key = %key_path.display(),
                "Certificate files already exist, keeping them"
            );
            return Ok(false);
        }

        for path in [cert_path, key_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create certificate directory: {}", parent.display())
                })?;
            }
        }

        std::fs::write(cert_path, &self.cert_pem).context("Failed to write certificate")?;
        std::fs::write(key_path, &self.key_pem).context("Failed to write private key")?;
        restrict_permissions(key_path)?;

        info!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            "Self-signed certificate written"
        );
        Ok(true)
    }
}

/// Positive, non-zero 128-bit serial
fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    SerialNumber::from_slice(&bytes)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .context("Failed to restrict private key permissions")
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Summary of an X.509 certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub subject_alt_names: Vec<String>,
}

impl CertificateInfo {
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let parsed = pem::parse(pem_data).context("Failed to decode certificate PEM")?;
        Self::from_der(parsed.contents())
    }

    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read certificate: {}", path.display()))?;
        Self::from_pem(&data)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| anyhow::anyhow!("Failed to parse certificate: {}", e))?;

        let subject_alt_names = match cert.subject_alternative_name() {
            Ok(Some(ext)) => ext
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(format!("DNS:{}", dns)),
                    GeneralName::IPAddress(ip) => format_ip(ip).map(|ip| format!("IP:{}", ip)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: cert.validity().not_before.to_datetime(),
            not_after: cert.validity().not_after.to_datetime(),
            subject_alt_names,
        })
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn days_remaining(&self) -> i64 {
        (self.not_after - OffsetDateTime::now_utc()).whole_days()
    }
}

fn format_ip(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

impl fmt::Display for CertificateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Subject:    {}", self.subject)?;
        writeln!(f, "Issuer:     {}", self.issuer)?;
        writeln!(f, "Serial:     {}", self.serial)?;
        writeln!(f, "Not before: {}", self.not_before)?;
        writeln!(f, "Not after:  {}", self.not_after)?;
        write!(f, "SANs:       {}", self.subject_alt_names.join(", "))
    }
}
