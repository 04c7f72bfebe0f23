//! `Mdm-Signature` header handling.

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use color_eyre::eyre::WrapErr as _;
use der::{Decode as _, Encode as _};

/// Extract the signer certificate from an `Mdm-Signature` header.
///
/// The header is a base64-encoded detached CMS SignedData over the request
/// body; the first embedded certificate is the device identity.
pub fn signer_certificate(signature_header: &str) -> color_eyre::eyre::Result<Vec<u8>> {
    use base64::Engine as _;

    let signature_der = base64::engine::general_purpose::STANDARD
        .decode(signature_header.trim())
        .wrap_err("failed to decode Mdm-Signature base64")?;

    let content_info = ContentInfo::from_der(&signature_der)
        .map_err(|e| color_eyre::eyre::eyre!("invalid CMS ContentInfo: {e}"))?;
    let signed_data: SignedData = content_info
        .content
        .decode_as()
        .map_err(|e| color_eyre::eyre::eyre!("invalid CMS SignedData: {e}"))?;

    let certificates = signed_data
        .certificates
        .ok_or_else(|| color_eyre::eyre::eyre!("Mdm-Signature carries no certificates"))?;

    for choice in certificates.0.iter() {
        if let CertificateChoices::Certificate(cert) = choice {
            return cert
                .to_der()
                .map_err(|e| color_eyre::eyre::eyre!("failed to encode signer certificate: {e}"));
        }
    }

    color_eyre::eyre::bail!("Mdm-Signature carries no X.509 certificate")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_cms() {
        // base64 of "hello"
        assert!(signer_certificate("aGVsbG8=").is_err());
        assert!(signer_certificate("%%%").is_err());
    }
}
