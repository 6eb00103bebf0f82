//! Splitting concatenated DER certificates.
//!
//! The agent delivers certificate chains and bundles as one opaque
//! `bytes` field holding back-to-back DER certificates. Finding where
//! one certificate ends only requires reading the outer SEQUENCE
//! header, so this module reads a single TLV per certificate instead
//! of pulling in an ASN.1 parser.

use tracing::debug;

/// Tag of a top-level DER SEQUENCE; every X.509 certificate starts
/// with one.
const SEQUENCE_TAG: u8 = 0x30;

/// One TLV read out of the head of a DER buffer.
#[derive(Debug, PartialEq, Eq)]
struct Tlv<'a> {
    tag: u8,
    /// Bytes occupied by the tag and the length octets.
    header_len: usize,
    value: &'a [u8],
}

impl Tlv<'_> {
    /// Bytes consumed by the whole TLV: tag, length octets, value.
    fn total_len(&self) -> usize {
        self.header_len + self.value.len()
    }
}

/// Reads the TLV at the head of `input` per X.690 DER.
///
/// Long-form lengths are capped at three octets (16 MiB); the
/// indefinite form (`0x80`) and anything longer are rejected, as is a
/// declared length running past the end of the buffer.
fn read_tlv(input: &[u8]) -> Option<Tlv<'_>> {
    let (&tag, rest) = input.split_first()?;
    let (&first_len_byte, rest) = rest.split_first()?;

    // Short form: low seven bits are the value length.
    if first_len_byte & 0x80 == 0 {
        let value = rest.get(..usize::from(first_len_byte))?;
        return Some(Tlv {
            tag,
            header_len: 2,
            value,
        });
    }

    // Long form: low seven bits give the number of big-endian length
    // octets that follow.
    let len_len = usize::from(first_len_byte & 0x7f);
    if len_len == 0 || len_len > 3 {
        return None;
    }
    let len_bytes = rest.get(..len_len)?;
    let value_len = len_bytes
        .iter()
        .fold(0usize, |len, &b| (len << 8) | usize::from(b));

    let value = rest.get(len_len..len_len + value_len)?;
    Some(Tlv {
        tag,
        header_len: 2 + len_len,
        value,
    })
}

/// Iterator over the individual certificates in a buffer of
/// concatenated DER certificates.
///
/// Each item is the exact byte run of one certificate TLV. The first
/// malformed or non-SEQUENCE TLV puts the iterator into an errored
/// state: iteration stops, and certificates already yielded remain
/// valid.
struct Certificates<'a> {
    input: &'a [u8],
    pos: usize,
    errored: bool,
}

impl<'a> Certificates<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            errored: false,
        }
    }

    fn has_error(&self) -> bool {
        self.errored
    }
}

impl<'a> Iterator for Certificates<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.errored || self.pos >= self.input.len() {
            return None;
        }
        let rest = &self.input[self.pos..];
        match read_tlv(rest) {
            Some(tlv) if tlv.tag == SEQUENCE_TAG => {
                let total_len = tlv.total_len();
                self.pos += total_len;
                Some(&rest[..total_len])
            }
            _ => {
                self.errored = true;
                None
            }
        }
    }
}

/// Splits `der` into individual certificates.
///
/// An empty input yields an empty vector. A malformed tail yields the
/// certificates read up to that point.
pub(crate) fn split_certificates(der: &[u8]) -> Vec<Vec<u8>> {
    let mut certs = Certificates::new(der);
    let split: Vec<Vec<u8>> = certs.by_ref().map(<[u8]>::to_vec).collect();
    if certs.has_error() {
        debug!(
            parsed = split.len(),
            "stopped splitting certificates at a malformed TLV"
        );
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn read_tlv_short_form() {
        let data = hex!("30 02 01 02");
        let tlv = read_tlv(&data).unwrap();
        assert_eq!(tlv.tag, 0x30);
        assert_eq!(tlv.value, &[0x01, 0x02]);
        assert_eq!(tlv.total_len(), 4);
    }

    #[test]
    fn read_tlv_long_form() {
        // Octet string, two length octets, 128 bytes of value.
        let mut data = vec![0x04, 0x81, 0x80];
        data.extend(std::iter::repeat(0xAA).take(128));

        let tlv = read_tlv(&data).unwrap();
        assert_eq!(tlv.tag, 0x04);
        assert_eq!(tlv.value.len(), 128);
        assert_eq!(tlv.total_len(), 131);
    }

    #[test]
    fn read_tlv_truncated() {
        // Declares five value bytes, provides one.
        assert_eq!(read_tlv(&hex!("30 05 01")), None);
    }

    #[test]
    fn read_tlv_rejects_indefinite_and_oversized_lengths() {
        // 0x80 is the indefinite form, forbidden in DER.
        assert_eq!(read_tlv(&hex!("30 80 00 00")), None);
        // Four length octets would allow > 16 MiB.
        assert_eq!(read_tlv(&hex!("30 84 00 00 00 01 AA")), None);
    }

    #[test]
    fn splits_two_certificates() {
        let data = hex!("30 02 01 01 30 02 02 02");
        let certs = split_certificates(&data);
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0], hex!("30 02 01 01"));
        assert_eq!(certs[1], hex!("30 02 02 02"));
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split_certificates(&[]).is_empty());
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(split_certificates(&hex!("FF FF FF")).is_empty());
    }

    #[test]
    fn non_sequence_tag_yields_nothing() {
        // A valid TLV, but not a SEQUENCE.
        let mut data = vec![0x04, 0x81, 0x80];
        data.extend(std::iter::repeat(0xAA).take(128));
        assert!(split_certificates(&data).is_empty());
    }

    #[test]
    fn truncated_tail_keeps_leading_certificates() {
        // One good certificate, then a TLV claiming five value bytes
        // with only one present.
        let data = hex!("30 02 01 01 30 05 01");
        let certs = split_certificates(&data);
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0], hex!("30 02 01 01"));
    }

    #[test]
    fn real_certificates_round_trip() {
        let key_a = rcgen::KeyPair::generate().unwrap();
        let cert_a = rcgen::CertificateParams::new(vec!["a.example.org".to_string()])
            .unwrap()
            .self_signed(&key_a)
            .unwrap();
        let key_b = rcgen::KeyPair::generate().unwrap();
        let cert_b = rcgen::CertificateParams::new(vec!["b.example.org".to_string()])
            .unwrap()
            .self_signed(&key_b)
            .unwrap();

        let mut concatenated = cert_a.der().to_vec();
        concatenated.extend_from_slice(cert_b.der());

        let certs = split_certificates(&concatenated);
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0], cert_a.der().as_ref());
        assert_eq!(certs[1], cert_b.der().as_ref());
    }
}
