//! Application PDU as it travels over the session layer
//!
//! A message is either an ACSE APDU (whose user-information may carry an
//! xDLMS PDU), a plain xDLMS PDU, or a glo-ciphered envelope around one.

use dlms_asn1::AcseApdu;
use dlms_core::{DlmsError, DlmsResult};
use dlms_security::encryption::is_glo_tag;

use crate::pdu::CosemPdu;

/// Decoded application message
///
/// After [`APdu::decode`] at most one of `cosem` and `ciphered` is set; for a
/// message that is not ACSE exactly one is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct APdu {
    pub acse: Option<AcseApdu>,
    pub cosem: Option<CosemPdu>,
    /// Complete glo envelope, tag byte included
    pub ciphered: Option<Vec<u8>>,
}

impl APdu {
    pub fn from_acse(acse: AcseApdu) -> Self {
        Self {
            acse: Some(acse),
            ..Default::default()
        }
    }

    pub fn from_cosem(cosem: CosemPdu) -> Self {
        Self {
            cosem: Some(cosem),
            ..Default::default()
        }
    }

    pub fn from_ciphered(envelope: Vec<u8>) -> Self {
        Self {
            ciphered: Some(envelope),
            ..Default::default()
        }
    }

    /// # Errors
    /// `ProtocolDecode` (or `Asn1Encoding` for a malformed ACSE APDU) when the
    /// message cannot be decoded.
    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let tag = *data
            .first()
            .ok_or_else(|| DlmsError::ProtocolDecode("Empty APDU".to_string()))?;
        if AcseApdu::is_acse_tag(tag) {
            let acse = AcseApdu::decode(data)?;
            let mut apdu = APdu::default();
            if let Some(info) = acse.user_information() {
                apdu.set_payload(info)?;
            }
            apdu.acse = Some(acse);
            return Ok(apdu);
        }
        let mut apdu = APdu::default();
        apdu.set_payload(data)?;
        Ok(apdu)
    }

    fn set_payload(&mut self, payload: &[u8]) -> DlmsResult<()> {
        match payload.first() {
            Some(&tag) if is_glo_tag(tag) => self.ciphered = Some(payload.to_vec()),
            Some(_) => self.cosem = Some(CosemPdu::decode(payload)?),
            None => {}
        }
        Ok(())
    }

    /// Encode; an ACSE APDU gets the xDLMS payload as its user-information.
    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        let payload = match (&self.ciphered, &self.cosem) {
            (Some(envelope), _) => Some(envelope.clone()),
            (None, Some(cosem)) => Some(cosem.encode()),
            (None, None) => None,
        };
        match (&self.acse, payload) {
            (Some(acse), payload) => {
                let mut acse = acse.clone();
                if payload.is_some() {
                    acse.set_user_information(payload);
                }
                acse.encode()
            }
            (None, Some(payload)) => Ok(payload),
            (None, None) => Err(DlmsError::InvalidData("Empty APdu".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{Conformance, ExceptionResponse, InitiateRequest, ServiceError, StateError};
    use dlms_asn1::iso_acse::{ReleaseRequestReason, RLRQApdu};
    use dlms_asn1::{AARQApdu, ContextId};

    #[test]
    fn test_aarq_carries_initiate_request() {
        let initiate = InitiateRequest::new(Conformance::logical_name_default(), 1024);
        let apdu = APdu {
            acse: Some(AcseApdu::Aarq(AARQApdu::new(ContextId::new(true, false)))),
            cosem: Some(CosemPdu::InitiateRequest(initiate.clone())),
            ciphered: None,
        };
        let decoded = APdu::decode(&apdu.encode().unwrap()).unwrap();
        assert!(matches!(decoded.acse, Some(AcseApdu::Aarq(_))));
        assert_eq!(decoded.cosem, Some(CosemPdu::InitiateRequest(initiate)));
        assert!(decoded.ciphered.is_none());
    }

    #[test]
    fn test_ciphered_payloads_stay_opaque() {
        let envelope = vec![0xC8, 0x06, 0x30, 0, 0, 0, 1, 0xAA];
        let decoded = APdu::decode(&envelope).unwrap();
        assert_eq!(decoded.ciphered.as_deref(), Some(envelope.as_slice()));
        assert!(decoded.cosem.is_none());

        let mut aarq = AARQApdu::new(ContextId::new(true, true));
        aarq.user_information = Some(vec![0x21, 0x05, 0x30, 0, 0, 0, 1]);
        let decoded = APdu::decode(&aarq.encode().unwrap()).unwrap();
        assert_eq!(decoded.ciphered.as_deref(), Some(&[0x21, 0x05, 0x30, 0, 0, 0, 1][..]));
    }

    #[test]
    fn test_plain_pdu_and_release() {
        let exception = ExceptionResponse::new(StateError::ServiceNotAllowed, ServiceError::OperationNotPossible);
        let decoded = APdu::decode(&exception.encode()).unwrap();
        assert_eq!(decoded.cosem, Some(CosemPdu::ExceptionResponse(exception)));
        assert!(decoded.acse.is_none());

        let rlrq = RLRQApdu::new(ReleaseRequestReason::Normal);
        let decoded = APdu::decode(&rlrq.encode().unwrap()).unwrap();
        assert!(matches!(decoded.acse, Some(AcseApdu::Rlrq(_))));
        assert!(decoded.cosem.is_none() && decoded.ciphered.is_none());
    }

    #[test]
    fn test_decode_errors() {
        assert!(APdu::decode(&[]).is_err());
        assert!(APdu::decode(&[0x42, 0x00]).is_err());
        assert!(APdu::default().encode().is_err());
    }
}
