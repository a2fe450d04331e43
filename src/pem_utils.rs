use crate::error::{PkiKitError, Result};

/// Convert DER-encoded data into a PEM-encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Convert a PEM-encoded string to DER-encoded bytes, ignoring its label.
pub fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_str)?;
    Ok(pem.contents().to_vec())
}

/// Convert a PEM-encoded string to DER-encoded bytes, requiring `label`.
pub fn pem_to_der_labeled(pem_str: &str, label: &str) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_str)?;
    if pem.tag() != label {
        return Err(PkiKitError::DecodingError(format!(
            "expected PEM label {label:?}, found {:?}",
            pem.tag()
        )));
    }
    Ok(pem.into_contents())
}

/// A value with a DER encoding and a fixed PEM label.
pub trait PemEncodable: Sized {
    const PEM_LABEL: &'static str;

    fn to_der(&self) -> Result<Vec<u8>>;

    fn from_der(der: &[u8]) -> Result<Self>;

    fn to_pem(&self) -> Result<String> {
        Ok(der_to_pem(&self.to_der()?, Self::PEM_LABEL))
    }

    fn from_pem(pem_str: &str) -> Result<Self> {
        Self::from_der(&pem_to_der_labeled(pem_str, Self::PEM_LABEL)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_is_checked() {
        let pem = der_to_pem(&[0x05, 0x00], "CERTIFICATE");
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert_eq!(pem_to_der(&pem).unwrap(), vec![0x05, 0x00]);
        assert_eq!(
            pem_to_der_labeled(&pem, "CERTIFICATE").unwrap(),
            vec![0x05, 0x00]
        );
        assert!(matches!(
            pem_to_der_labeled(&pem, "CERTIFICATE REQUEST"),
            Err(PkiKitError::DecodingError(_))
        ));
    }
}
