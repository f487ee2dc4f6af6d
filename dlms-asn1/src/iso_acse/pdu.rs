//! ISO-ACSE PDU structures
//!
//! - AARQ (Association Request, `[APPLICATION 0]`)
//! - AARE (Association Response, `[APPLICATION 1]`)
//! - RLRQ (Release Request, `[APPLICATION 2]`)
//! - RLRE (Release Response, `[APPLICATION 3]`)
//!
//! Fields are written in ascending tag order. Fields DLMS does not use are
//! skipped on decode.

use super::types::*;
use crate::ber::decoder::{
    decode_explicit_octet_string, decode_explicit_oid, decode_integer, BerDecoder,
};
use crate::ber::types::{decode_oid, INTEGER};
use crate::ber::{BerEncoder, BerTag};
use crate::error::{DlmsError, DlmsResult};

const AARQ_TAG: BerTag = BerTag::application(true, 0);
const AARE_TAG: BerTag = BerTag::application(true, 1);
const RLRQ_TAG: BerTag = BerTag::application(true, 2);
const RLRE_TAG: BerTag = BerTag::application(true, 3);

const APPLICATION_CONTEXT_NAME: BerTag = BerTag::context_specific(true, 1);
const RESULT: BerTag = BerTag::context_specific(true, 2);
const RESULT_SOURCE_DIAGNOSTIC: BerTag = BerTag::context_specific(true, 3);
const RESPONDING_AP_TITLE: BerTag = BerTag::context_specific(true, 4);
const CALLING_AP_TITLE: BerTag = BerTag::context_specific(true, 6);
const SENDER_ACSE_REQUIREMENTS: BerTag = BerTag::context_specific(false, 10);
const AARQ_MECHANISM_NAME: BerTag = BerTag::context_specific(false, 11);
const CALLING_AUTHENTICATION_VALUE: BerTag = BerTag::context_specific(true, 12);
const RESPONDER_ACSE_REQUIREMENTS: BerTag = BerTag::context_specific(false, 8);
const AARE_MECHANISM_NAME: BerTag = BerTag::context_specific(false, 9);
const RESPONDING_AUTHENTICATION_VALUE: BerTag = BerTag::context_specific(true, 10);
const USER_INFORMATION: BerTag = BerTag::context_specific(true, 30);
const RELEASE_REASON: BerTag = BerTag::context_specific(false, 0);
const CHARSTRING: BerTag = BerTag::context_specific(false, 0);
const SERVICE_USER: BerTag = BerTag::context_specific(true, 1);
const SERVICE_PROVIDER: BerTag = BerTag::context_specific(true, 2);

/// ACSE requirements BIT STRING with only the authentication functional unit set
const AUTHENTICATION_REQUIREMENT: [u8; 2] = [0x07, 0x80];

/// AARQ (Association Request) PDU
///
/// `user_information` holds the A-XDR encoded xDLMS initiate-request, plain or
/// ciphered; `calling_authentication_value` holds the LOW password or the
/// client-to-server challenge.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AARQApdu {
    pub application_context_name: Vec<u32>,
    pub calling_ap_title: Option<Vec<u8>>,
    pub sender_acse_requirements: bool,
    pub mechanism_name: Option<Vec<u32>>,
    pub calling_authentication_value: Option<Vec<u8>>,
    pub user_information: Option<Vec<u8>>,
}

impl AARQApdu {
    pub fn new(context: ContextId) -> Self {
        Self {
            application_context_name: context.oid(),
            ..Default::default()
        }
    }

    pub fn context_id(&self) -> Option<ContextId> {
        ContextId::from_oid(&self.application_context_name)
    }

    /// Mechanism id of the presented mechanism name, if any.
    pub fn mechanism_id(&self) -> Option<u32> {
        self.mechanism_name.as_deref().and_then(mechanism_id)
    }

    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        let mut encoder = BerEncoder::new();
        encoder.encode_constructed(AARQ_TAG, |fields| {
            fields.encode_explicit_oid(APPLICATION_CONTEXT_NAME, &self.application_context_name)?;
            if let Some(title) = &self.calling_ap_title {
                fields.encode_explicit_octet_string(CALLING_AP_TITLE, title)?;
            }
            if self.sender_acse_requirements {
                fields.encode_tlv(SENDER_ACSE_REQUIREMENTS, &AUTHENTICATION_REQUIREMENT);
            }
            if let Some(mechanism) = &self.mechanism_name {
                fields.encode_implicit_oid(AARQ_MECHANISM_NAME, mechanism)?;
            }
            if let Some(value) = &self.calling_authentication_value {
                encode_authentication_value(fields, CALLING_AUTHENTICATION_VALUE, value)?;
            }
            if let Some(info) = &self.user_information {
                fields.encode_explicit_octet_string(USER_INFORMATION, info)?;
            }
            Ok(())
        })?;
        Ok(encoder.into_bytes())
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut outer = BerDecoder::new(data);
        let content = outer.expect_tlv(AARQ_TAG)?;
        let mut aarq = AARQApdu::default();
        let mut has_context = false;
        let mut fields = BerDecoder::new(content);
        while !fields.is_empty() {
            let (tag, value) = fields.read_tlv()?;
            match tag {
                APPLICATION_CONTEXT_NAME => {
                    aarq.application_context_name = decode_explicit_oid(value)?;
                    has_context = true;
                }
                CALLING_AP_TITLE => aarq.calling_ap_title = Some(decode_explicit_octet_string(value)?),
                SENDER_ACSE_REQUIREMENTS => {
                    aarq.sender_acse_requirements = value.get(1).is_some_and(|b| b & 0x80 != 0)
                }
                AARQ_MECHANISM_NAME => aarq.mechanism_name = Some(decode_oid(value)?),
                CALLING_AUTHENTICATION_VALUE => {
                    aarq.calling_authentication_value = Some(decode_authentication_value(value)?)
                }
                USER_INFORMATION => aarq.user_information = Some(decode_explicit_octet_string(value)?),
                _ => {}
            }
        }
        if !has_context {
            return Err(DlmsError::Asn1Encoding(
                "AARQ without application-context-name".to_string(),
            ));
        }
        Ok(aarq)
    }
}

/// AARE (Association Response) PDU
#[derive(Debug, Clone, PartialEq)]
pub struct AAREApdu {
    pub application_context_name: Vec<u32>,
    pub result: AssociateResult,
    pub result_source_diagnostic: AssociateSourceDiagnostic,
    pub responding_ap_title: Option<Vec<u8>>,
    pub responder_acse_requirements: bool,
    pub mechanism_name: Option<Vec<u32>>,
    pub responding_authentication_value: Option<Vec<u8>>,
    pub user_information: Option<Vec<u8>>,
}

impl AAREApdu {
    pub fn new(
        application_context_name: Vec<u32>,
        result: AssociateResult,
        result_source_diagnostic: AssociateSourceDiagnostic,
    ) -> Self {
        Self {
            application_context_name,
            result,
            result_source_diagnostic,
            responding_ap_title: None,
            responder_acse_requirements: false,
            mechanism_name: None,
            responding_authentication_value: None,
            user_information: None,
        }
    }

    /// Rejection carrying an acse-service-user diagnostic.
    pub fn rejected(
        application_context_name: Vec<u32>,
        result: AssociateResult,
        diagnostic: AcseServiceUserDiagnostic,
    ) -> Self {
        Self::new(
            application_context_name,
            result,
            AssociateSourceDiagnostic::ServiceUser(diagnostic),
        )
    }

    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        let mut encoder = BerEncoder::new();
        encoder.encode_constructed(AARE_TAG, |fields| {
            fields.encode_explicit_oid(APPLICATION_CONTEXT_NAME, &self.application_context_name)?;
            fields.encode_constructed(RESULT, |inner| {
                inner.encode_integer(INTEGER, self.result.value());
                Ok(())
            })?;
            let (choice, value) = match self.result_source_diagnostic {
                AssociateSourceDiagnostic::ServiceUser(diag) => (SERVICE_USER, diag.value()),
                AssociateSourceDiagnostic::ServiceProvider(diag) => (SERVICE_PROVIDER, diag),
            };
            fields.encode_constructed(RESULT_SOURCE_DIAGNOSTIC, |inner| {
                inner.encode_constructed(choice, |leaf| {
                    leaf.encode_integer(INTEGER, value);
                    Ok(())
                })
            })?;
            if let Some(title) = &self.responding_ap_title {
                fields.encode_explicit_octet_string(RESPONDING_AP_TITLE, title)?;
            }
            if self.responder_acse_requirements {
                fields.encode_tlv(RESPONDER_ACSE_REQUIREMENTS, &AUTHENTICATION_REQUIREMENT);
            }
            if let Some(mechanism) = &self.mechanism_name {
                fields.encode_implicit_oid(AARE_MECHANISM_NAME, mechanism)?;
            }
            if let Some(value) = &self.responding_authentication_value {
                encode_authentication_value(fields, RESPONDING_AUTHENTICATION_VALUE, value)?;
            }
            if let Some(info) = &self.user_information {
                fields.encode_explicit_octet_string(USER_INFORMATION, info)?;
            }
            Ok(())
        })?;
        Ok(encoder.into_bytes())
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let mut outer = BerDecoder::new(data);
        let content = outer.expect_tlv(AARE_TAG)?;
        let mut aare = AAREApdu::new(
            Vec::new(),
            AssociateResult::RejectedPermanent,
            AssociateSourceDiagnostic::default(),
        );
        let mut has_result = false;
        let mut fields = BerDecoder::new(content);
        while !fields.is_empty() {
            let (tag, value) = fields.read_tlv()?;
            match tag {
                APPLICATION_CONTEXT_NAME => aare.application_context_name = decode_explicit_oid(value)?,
                RESULT => {
                    let mut inner = BerDecoder::new(value);
                    aare.result = AssociateResult::from_value(decode_integer(inner.expect_tlv(INTEGER)?)?)?;
                    has_result = true;
                }
                RESULT_SOURCE_DIAGNOSTIC => {
                    let mut inner = BerDecoder::new(value);
                    let (choice, leaf) = inner.read_tlv()?;
                    let code = decode_integer(BerDecoder::new(leaf).expect_tlv(INTEGER)?)?;
                    aare.result_source_diagnostic = match choice {
                        SERVICE_USER => AssociateSourceDiagnostic::ServiceUser(
                            AcseServiceUserDiagnostic::from_value(code)?,
                        ),
                        SERVICE_PROVIDER => AssociateSourceDiagnostic::ServiceProvider(code),
                        _ => {
                            return Err(DlmsError::Asn1Encoding(
                                "Unknown result-source-diagnostic choice".to_string(),
                            ));
                        }
                    };
                }
                RESPONDING_AP_TITLE => {
                    aare.responding_ap_title = Some(decode_explicit_octet_string(value)?)
                }
                RESPONDER_ACSE_REQUIREMENTS => {
                    aare.responder_acse_requirements = value.get(1).is_some_and(|b| b & 0x80 != 0)
                }
                AARE_MECHANISM_NAME => aare.mechanism_name = Some(decode_oid(value)?),
                RESPONDING_AUTHENTICATION_VALUE => {
                    aare.responding_authentication_value = Some(decode_authentication_value(value)?)
                }
                USER_INFORMATION => aare.user_information = Some(decode_explicit_octet_string(value)?),
                _ => {}
            }
        }
        if !has_result {
            return Err(DlmsError::Asn1Encoding("AARE without result".to_string()));
        }
        Ok(aare)
    }
}

/// RLRQ (Release Request) PDU
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RLRQApdu {
    pub reason: Option<ReleaseRequestReason>,
    pub user_information: Option<Vec<u8>>,
}

impl RLRQApdu {
    pub fn new(reason: ReleaseRequestReason) -> Self {
        Self {
            reason: Some(reason),
            user_information: None,
        }
    }

    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        encode_release(
            RLRQ_TAG,
            self.reason.map(ReleaseRequestReason::value),
            self.user_information.as_deref(),
        )
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let (reason, user_information) = decode_release(RLRQ_TAG, data)?;
        Ok(Self {
            reason: reason.and_then(ReleaseRequestReason::from_value),
            user_information,
        })
    }
}

/// RLRE (Release Response) PDU
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RLREApdu {
    pub reason: Option<ReleaseResponseReason>,
    pub user_information: Option<Vec<u8>>,
}

impl RLREApdu {
    pub fn new(reason: ReleaseResponseReason) -> Self {
        Self {
            reason: Some(reason),
            user_information: None,
        }
    }

    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        encode_release(
            RLRE_TAG,
            self.reason.map(ReleaseResponseReason::value),
            self.user_information.as_deref(),
        )
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        let (reason, user_information) = decode_release(RLRE_TAG, data)?;
        Ok(Self {
            reason: reason.and_then(ReleaseResponseReason::from_value),
            user_information,
        })
    }
}

/// Any of the four ACSE APDUs
#[derive(Debug, Clone, PartialEq)]
pub enum AcseApdu {
    Aarq(AARQApdu),
    Aare(AAREApdu),
    Rlrq(RLRQApdu),
    Rlre(RLREApdu),
}

impl AcseApdu {
    /// Whether `tag` opens an ACSE APDU.
    pub fn is_acse_tag(tag: u8) -> bool {
        (0x60..=0x63).contains(&tag)
    }

    pub fn encode(&self) -> DlmsResult<Vec<u8>> {
        match self {
            AcseApdu::Aarq(pdu) => pdu.encode(),
            AcseApdu::Aare(pdu) => pdu.encode(),
            AcseApdu::Rlrq(pdu) => pdu.encode(),
            AcseApdu::Rlre(pdu) => pdu.encode(),
        }
    }

    pub fn decode(data: &[u8]) -> DlmsResult<Self> {
        match data.first() {
            Some(0x60) => AARQApdu::decode(data).map(AcseApdu::Aarq),
            Some(0x61) => AAREApdu::decode(data).map(AcseApdu::Aare),
            Some(0x62) => RLRQApdu::decode(data).map(AcseApdu::Rlrq),
            Some(0x63) => RLREApdu::decode(data).map(AcseApdu::Rlre),
            Some(tag) => Err(DlmsError::Asn1Encoding(format!("Not an ACSE APDU: 0x{:02X}", tag))),
            None => Err(DlmsError::Asn1Encoding("Empty ACSE APDU".to_string())),
        }
    }

    /// User-information payload of whichever APDU this is.
    pub fn user_information(&self) -> Option<&[u8]> {
        match self {
            AcseApdu::Aarq(pdu) => pdu.user_information.as_deref(),
            AcseApdu::Aare(pdu) => pdu.user_information.as_deref(),
            AcseApdu::Rlrq(pdu) => pdu.user_information.as_deref(),
            AcseApdu::Rlre(pdu) => pdu.user_information.as_deref(),
        }
    }

    pub fn set_user_information(&mut self, info: Option<Vec<u8>>) {
        match self {
            AcseApdu::Aarq(pdu) => pdu.user_information = info,
            AcseApdu::Aare(pdu) => pdu.user_information = info,
            AcseApdu::Rlrq(pdu) => pdu.user_information = info,
            AcseApdu::Rlre(pdu) => pdu.user_information = info,
        }
    }
}

fn encode_authentication_value(fields: &mut BerEncoder, tag: BerTag, value: &[u8]) -> DlmsResult<()> {
    fields.encode_constructed(tag, |inner| {
        inner.encode_tlv(CHARSTRING, value);
        Ok(())
    })
}

fn decode_authentication_value(content: &[u8]) -> DlmsResult<Vec<u8>> {
    let mut inner = BerDecoder::new(content);
    Ok(inner.expect_tlv(CHARSTRING)?.to_vec())
}

fn encode_release(tag: BerTag, reason: Option<u8>, user_information: Option<&[u8]>) -> DlmsResult<Vec<u8>> {
    let mut encoder = BerEncoder::new();
    encoder.encode_constructed(tag, |fields| {
        if let Some(reason) = reason {
            fields.encode_integer(RELEASE_REASON, reason);
        }
        if let Some(info) = user_information {
            fields.encode_explicit_octet_string(USER_INFORMATION, info)?;
        }
        Ok(())
    })?;
    Ok(encoder.into_bytes())
}

fn decode_release(tag: BerTag, data: &[u8]) -> DlmsResult<(Option<u8>, Option<Vec<u8>>)> {
    let mut outer = BerDecoder::new(data);
    let content = outer.expect_tlv(tag)?;
    let mut reason = None;
    let mut user_information = None;
    let mut fields = BerDecoder::new(content);
    while !fields.is_empty() {
        let (field, value) = fields.read_tlv()?;
        match field {
            RELEASE_REASON => reason = Some(decode_integer(value)?),
            USER_INFORMATION => user_information = Some(decode_explicit_octet_string(value)?),
            _ => {}
        }
    }
    Ok((reason, user_information))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aarq_wire_layout() {
        let mut aarq = AARQApdu::new(ContextId::LogicalNameReferencingNoCiphering);
        aarq.sender_acse_requirements = true;
        aarq.mechanism_name = Some(mechanism_oid(1));
        aarq.calling_authentication_value = Some(b"12345678".to_vec());
        aarq.user_information = Some(vec![0x01, 0x00]);
        let bytes = aarq.encode().unwrap();
        let expected = hex::decode(concat!(
            "602A",
            "A109060760857405080101",
            "8A020780",
            "8B0760857405080201",
            "AC0A80083132333435363738",
            "BE0404020100"
        ))
        .unwrap();
        assert_eq!(bytes, expected);
        let decoded = AARQApdu::decode(&bytes).unwrap();
        assert_eq!(decoded, aarq);
        assert_eq!(decoded.mechanism_id(), Some(1));
        assert_eq!(decoded.context_id(), Some(ContextId::LogicalNameReferencingNoCiphering));
    }

    #[test]
    fn test_aarq_skips_unused_fields() {
        // protocol-version [0] precedes the context name
        let bytes = hex::decode("600F80020780A109060760857405080102").unwrap();
        let aarq = AARQApdu::decode(&bytes).unwrap();
        assert_eq!(aarq.context_id(), Some(ContextId::ShortNameReferencingNoCiphering));
        assert_eq!(aarq.mechanism_id(), None);
    }

    #[test]
    fn test_aare_rejection_layout() {
        let aare = AAREApdu::rejected(
            ContextId::LogicalNameReferencingNoCiphering.oid(),
            AssociateResult::RejectedPermanent,
            AcseServiceUserDiagnostic::AuthenticationFailure,
        );
        let bytes = aare.encode().unwrap();
        let expected = hex::decode(concat!(
            "6117",
            "A109060760857405080101",
            "A203020101",
            "A305A10302010D"
        ))
        .unwrap();
        assert_eq!(bytes, expected);
        assert_eq!(AAREApdu::decode(&bytes).unwrap(), aare);
    }

    #[test]
    fn test_aare_with_challenge() {
        let mut aare = AAREApdu::new(
            ContextId::LogicalNameReferencingWithCiphering.oid(),
            AssociateResult::Accepted,
            AssociateSourceDiagnostic::ServiceUser(AcseServiceUserDiagnostic::AuthenticationRequired),
        );
        aare.responding_ap_title = Some(vec![0x4D, 0x4D, 0x4D, 0, 0, 0, 0, 1]);
        aare.responder_acse_requirements = true;
        aare.mechanism_name = Some(mechanism_oid(5));
        aare.responding_authentication_value = Some(vec![0xAB; 16]);
        aare.user_information = Some(vec![0x28, 0x00]);
        let decoded = AAREApdu::decode(&aare.encode().unwrap()).unwrap();
        assert_eq!(decoded, aare);
    }

    #[test]
    fn test_release_pdus() {
        let rlrq = RLRQApdu::new(ReleaseRequestReason::Urgent);
        let bytes = rlrq.encode().unwrap();
        assert_eq!(bytes, vec![0x62, 0x03, 0x80, 0x01, 0x01]);
        assert_eq!(AcseApdu::decode(&bytes).unwrap(), AcseApdu::Rlrq(rlrq));

        let rlre = RLREApdu::new(ReleaseResponseReason::UserDefined);
        assert_eq!(rlre.encode().unwrap(), vec![0x63, 0x03, 0x80, 0x01, 0x1E]);

        let empty = RLRQApdu::decode(&[0x62, 0x00]).unwrap();
        assert_eq!(empty.reason, None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(AcseApdu::decode(&[0x60, 0x05, 0xA1]).is_err());
        assert!(AcseApdu::decode(&[0xC0, 0x01]).is_err());
        assert!(AARQApdu::decode(&[0x60, 0x00]).is_err());
    }
}
