//! Building blocks shared by the GET, SET, ACTION and SN PDUs

use dlms_asn1::{AxdrDecoder, AxdrEncoder};
use dlms_core::{DataObject, DlmsError, DlmsResult, ObisCode};

/// Invoke-Id-And-Priority byte
///
/// Bits 0-3 carry the invoke id, bit 6 the service class (1 = confirmed)
/// and bit 7 the priority (1 = high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvokeIdAndPriority(u8);

impl InvokeIdAndPriority {
    const CONFIRMED: u8 = 0x40;
    const HIGH_PRIORITY: u8 = 0x80;

    /// Confirmed service with invoke id `invoke_id` (taken mod 16).
    pub fn new(invoke_id: u8, high_priority: bool) -> Self {
        let mut byte = (invoke_id & 0x0F) | Self::CONFIRMED;
        if high_priority {
            byte |= Self::HIGH_PRIORITY;
        }
        Self(byte)
    }

    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn value(&self) -> u8 {
        self.0
    }

    pub const fn invoke_id(&self) -> u8 {
        self.0 & 0x0F
    }

    pub const fn is_confirmed(&self) -> bool {
        self.0 & Self::CONFIRMED != 0
    }

    pub const fn is_high_priority(&self) -> bool {
        self.0 & Self::HIGH_PRIORITY != 0
    }
}

/// Cosem-Attribute-Descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CosemAttributeDescriptor {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub attribute_id: u8,
}

impl CosemAttributeDescriptor {
    pub const fn new(class_id: u16, instance_id: ObisCode, attribute_id: u8) -> Self {
        Self {
            class_id,
            instance_id,
            attribute_id,
        }
    }

    pub(crate) fn encode_into(&self, encoder: &mut AxdrEncoder) {
        encoder.encode_u16(self.class_id);
        encoder.encode_bytes(self.instance_id.as_bytes());
        encoder.encode_u8(self.attribute_id);
    }

    pub(crate) fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let class_id = decoder.decode_u16()?;
        let instance_id = ObisCode::from_slice(decoder.decode_bytes(6)?)?;
        let attribute_id = decoder.decode_u8()?;
        Ok(Self::new(class_id, instance_id, attribute_id))
    }
}

/// Cosem-Method-Descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CosemMethodDescriptor {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub method_id: u8,
}

impl CosemMethodDescriptor {
    pub const fn new(class_id: u16, instance_id: ObisCode, method_id: u8) -> Self {
        Self {
            class_id,
            instance_id,
            method_id,
        }
    }

    pub(crate) fn encode_into(&self, encoder: &mut AxdrEncoder) {
        encoder.encode_u16(self.class_id);
        encoder.encode_bytes(self.instance_id.as_bytes());
        encoder.encode_u8(self.method_id);
    }

    pub(crate) fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let class_id = decoder.decode_u16()?;
        let instance_id = ObisCode::from_slice(decoder.decode_bytes(6)?)?;
        let method_id = decoder.decode_u8()?;
        Ok(Self::new(class_id, instance_id, method_id))
    }
}

/// Selective-Access-Descriptor: selector plus selector-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SelectiveAccessDescriptor {
    pub access_selector: u8,
    pub access_parameters: DataObject,
}

impl SelectiveAccessDescriptor {
    pub fn new(access_selector: u8, access_parameters: DataObject) -> Self {
        Self {
            access_selector,
            access_parameters,
        }
    }

    pub(crate) fn encode_into(&self, encoder: &mut AxdrEncoder) {
        encoder.encode_u8(self.access_selector);
        encoder.encode_data_object(&self.access_parameters);
    }

    pub(crate) fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let access_selector = decoder.decode_u8()?;
        let access_parameters = decoder.decode_data_object()?;
        Ok(Self::new(access_selector, access_parameters))
    }
}

/// Attribute descriptor with its optional access selection
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeReference {
    pub descriptor: CosemAttributeDescriptor,
    pub access_selection: Option<SelectiveAccessDescriptor>,
}

impl AttributeReference {
    pub fn new(descriptor: CosemAttributeDescriptor) -> Self {
        Self {
            descriptor,
            access_selection: None,
        }
    }

    pub fn with_selection(mut self, selection: SelectiveAccessDescriptor) -> Self {
        self.access_selection = Some(selection);
        self
    }

    pub(crate) fn encode_into(&self, encoder: &mut AxdrEncoder) {
        self.descriptor.encode_into(encoder);
        encoder.encode_optional(self.access_selection.as_ref(), |e, s| s.encode_into(e));
    }

    pub(crate) fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        let descriptor = CosemAttributeDescriptor::decode_from(decoder)?;
        let access_selection = decoder.decode_optional(SelectiveAccessDescriptor::decode_from)?;
        Ok(Self {
            descriptor,
            access_selection,
        })
    }
}

macro_rules! result_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn value(self) -> u8 {
                self as u8
            }

            pub(crate) fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
                let value = decoder.decode_u8()?;
                Self::from_u8(value).ok_or_else(|| {
                    DlmsError::ProtocolDecode(format!(
                        concat!("Unknown ", stringify!($name), " {}"),
                        value
                    ))
                })
            }
        }
    };
}

result_enum!(
    /// Data-Access-Result of GET, SET, READ and WRITE
    DataAccessResult {
        Success = 0,
        HardwareFault = 1,
        TemporaryFailure = 2,
        ReadWriteDenied = 3,
        ObjectUndefined = 4,
        ObjectClassInconsistent = 9,
        ObjectUnavailable = 11,
        TypeUnmatched = 12,
        ScopeOfAccessViolated = 13,
        DataBlockUnavailable = 14,
        LongGetAborted = 15,
        NoLongGetInProgress = 16,
        LongSetAborted = 17,
        NoLongSetInProgress = 18,
        DataBlockNumberInvalid = 19,
        OtherReason = 250,
    }
);

result_enum!(
    /// Action-Result of ACTION
    ActionResult {
        Success = 0,
        HardwareFault = 1,
        TemporaryFailure = 2,
        ReadWriteDenied = 3,
        ObjectUndefined = 4,
        ObjectClassInconsistent = 9,
        ObjectUnavailable = 11,
        TypeUnmatched = 12,
        ScopeOfAccessViolated = 13,
        DataBlockUnavailable = 14,
        LongActionAborted = 15,
        NoLongActionInProgress = 16,
        OtherReason = 250,
    }
);

/// Get-Data-Result: a value or the reason there is none
#[derive(Debug, Clone, PartialEq)]
pub enum GetDataResult {
    Data(DataObject),
    DataAccessResult(DataAccessResult),
}

impl GetDataResult {
    pub(crate) fn encode_into(&self, encoder: &mut AxdrEncoder) {
        match self {
            GetDataResult::Data(data) => {
                encoder.encode_u8(0);
                encoder.encode_data_object(data);
            }
            GetDataResult::DataAccessResult(result) => {
                encoder.encode_u8(1);
                encoder.encode_u8(result.value());
            }
        }
    }

    pub(crate) fn decode_from(decoder: &mut AxdrDecoder<'_>) -> DlmsResult<Self> {
        match decoder.decode_u8()? {
            0 => Ok(GetDataResult::Data(decoder.decode_data_object()?)),
            1 => Ok(GetDataResult::DataAccessResult(DataAccessResult::decode_from(decoder)?)),
            other => Err(DlmsError::ProtocolDecode(format!(
                "Unknown Get-Data-Result choice {}",
                other
            ))),
        }
    }
}

impl GetDataResult {
    /// SEQUENCE OF Get-Data-Result, the raw data of a long GET with-list.
    pub fn encode_list(results: &[Self]) -> Vec<u8> {
        let mut encoder = AxdrEncoder::new();
        encode_sequence(&mut encoder, results, |e, r| r.encode_into(e));
        encoder.into_bytes()
    }

    pub fn decode_list(data: &[u8]) -> DlmsResult<Vec<Self>> {
        let mut decoder = AxdrDecoder::new(data);
        let results = decode_sequence(&mut decoder, Self::decode_from)?;
        expect_end(&decoder, "Get-Data-Result list")?;
        Ok(results)
    }
}

/// A single `Data` value, the raw data of a long GET or ACTION.
pub fn encode_data(data: &DataObject) -> Vec<u8> {
    let mut encoder = AxdrEncoder::new();
    encoder.encode_data_object(data);
    encoder.into_bytes()
}

pub fn decode_data(data: &[u8]) -> DlmsResult<DataObject> {
    let mut decoder = AxdrDecoder::new(data);
    let value = decoder.decode_data_object()?;
    expect_end(&decoder, "Data")?;
    Ok(value)
}

/// Encode `items` as an A-XDR SEQUENCE OF: element count, then each element.
pub(crate) fn encode_sequence<T>(
    encoder: &mut AxdrEncoder,
    items: &[T],
    mut encode: impl FnMut(&mut AxdrEncoder, &T),
) {
    encoder.encode_length(items.len());
    for item in items {
        encode(encoder, item);
    }
}

pub(crate) fn decode_sequence<'a, T>(
    decoder: &mut AxdrDecoder<'a>,
    mut decode: impl FnMut(&mut AxdrDecoder<'a>) -> DlmsResult<T>,
) -> DlmsResult<Vec<T>> {
    let count = decoder.decode_length()?;
    // Every element takes at least one byte.
    if count > decoder.remaining() {
        return Err(DlmsError::ProtocolDecode(format!(
            "SEQUENCE OF {} element(s) in {} byte(s)",
            count,
            decoder.remaining()
        )));
    }
    (0..count).map(|_| decode(decoder)).collect()
}

/// Check the tag byte and the variant choice byte that open a PDU.
pub(crate) fn expect_tag(decoder: &mut AxdrDecoder<'_>, tag: u8, name: &str) -> DlmsResult<()> {
    let found = decoder.decode_u8()?;
    if found != tag {
        return Err(DlmsError::ProtocolDecode(format!(
            "Expected {} tag 0x{:02X}, got 0x{:02X}",
            name, tag, found
        )));
    }
    Ok(())
}

/// Reject trailing bytes after a complete PDU.
pub(crate) fn expect_end(decoder: &AxdrDecoder<'_>, name: &str) -> DlmsResult<()> {
    if decoder.is_empty() {
        Ok(())
    } else {
        Err(DlmsError::ProtocolDecode(format!(
            "{} trailing byte(s) after {}",
            decoder.remaining(),
            name
        )))
    }
}

pub(crate) fn unknown_choice(name: &str, choice: u8) -> DlmsError {
    DlmsError::ProtocolDecode(format!("Unknown {} choice {}", name, choice))
}
