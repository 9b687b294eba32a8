//! Fixed-capacity EXIF-style metadata table
//!
//! A [`MetadataTable`] holds up to [`MAX_METADATA_ENTRIES`] `(tag, value)`
//! pairs in insertion order. Values are typed; numeric values with a single
//! element are kept inline ([`Values::One`]) while multi-element values own a
//! heap array ([`Values::Many`]). ASCII and undefined payloads are always
//! heap-backed. Dropping the table frees every payload.
//!
//! Entries can be built from typed values with [`MetadataTable::add`] or from
//! packed little-endian bytes with [`MetadataTable::add_raw`];
//! [`MetadataValue::to_bytes`] produces the same packing back.

use crate::error::{PostProcError, Result};

/// Maximum number of entries a table can hold
pub const MAX_METADATA_ENTRIES: usize = 17;

/// Unsigned rational (numerator / denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub num: u32,
    pub denom: u32,
}

/// Signed rational (numerator / denominator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SRational {
    pub num: i32,
    pub denom: i32,
}

/// Wire type of a metadata value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    Undefined,
    SLong,
    SRational,
}

impl MetadataType {
    /// Size in bytes of one element of this type
    pub fn element_size(self) -> usize {
        match self {
            MetadataType::Byte | MetadataType::Ascii | MetadataType::Undefined => 1,
            MetadataType::Short => 2,
            MetadataType::Long | MetadataType::SLong => 4,
            MetadataType::Rational | MetadataType::SRational => 8,
        }
    }
}

/// Numeric payload: a single inline element or an owned array
#[derive(Debug, Clone, PartialEq)]
pub enum Values<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Copy> Values<T> {
    fn from_slice(items: &[T]) -> Result<Self> {
        match items {
            [] => Err(PostProcError::invalid("metadata value with zero elements")),
            [one] => Ok(Values::One(*one)),
            many => Ok(Values::Many(copy_to_vec(many)?)),
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            Values::One(v) => std::slice::from_ref(v),
            Values::Many(v) => v,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// A typed metadata value
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Byte(Values<u8>),
    Ascii(Vec<u8>),
    Short(Values<u16>),
    Long(Values<u32>),
    Rational(Values<Rational>),
    Undefined(Vec<u8>),
    SLong(Values<i32>),
    SRational(Values<SRational>),
}

impl MetadataValue {
    pub fn bytes(items: &[u8]) -> Result<Self> {
        Values::from_slice(items).map(MetadataValue::Byte)
    }

    pub fn ascii(text: &str) -> Result<Self> {
        Ok(MetadataValue::Ascii(copy_to_vec(text.as_bytes())?))
    }

    pub fn shorts(items: &[u16]) -> Result<Self> {
        Values::from_slice(items).map(MetadataValue::Short)
    }

    pub fn longs(items: &[u32]) -> Result<Self> {
        Values::from_slice(items).map(MetadataValue::Long)
    }

    pub fn rationals(items: &[Rational]) -> Result<Self> {
        Values::from_slice(items).map(MetadataValue::Rational)
    }

    pub fn undefined(items: &[u8]) -> Result<Self> {
        Ok(MetadataValue::Undefined(copy_to_vec(items)?))
    }

    pub fn slongs(items: &[i32]) -> Result<Self> {
        Values::from_slice(items).map(MetadataValue::SLong)
    }

    pub fn srationals(items: &[SRational]) -> Result<Self> {
        Values::from_slice(items).map(MetadataValue::SRational)
    }

    pub fn metadata_type(&self) -> MetadataType {
        match self {
            MetadataValue::Byte(_) => MetadataType::Byte,
            MetadataValue::Ascii(_) => MetadataType::Ascii,
            MetadataValue::Short(_) => MetadataType::Short,
            MetadataValue::Long(_) => MetadataType::Long,
            MetadataValue::Rational(_) => MetadataType::Rational,
            MetadataValue::Undefined(_) => MetadataType::Undefined,
            MetadataValue::SLong(_) => MetadataType::SLong,
            MetadataValue::SRational(_) => MetadataType::SRational,
        }
    }

    /// Number of elements
    pub fn count(&self) -> usize {
        match self {
            MetadataValue::Byte(v) => v.len(),
            MetadataValue::Ascii(v) | MetadataValue::Undefined(v) => v.len(),
            MetadataValue::Short(v) => v.len(),
            MetadataValue::Long(v) => v.len(),
            MetadataValue::Rational(v) => v.len(),
            MetadataValue::SLong(v) => v.len(),
            MetadataValue::SRational(v) => v.len(),
        }
    }

    /// True when the payload is stored without a heap array
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            MetadataValue::Byte(Values::One(_))
                | MetadataValue::Short(Values::One(_))
                | MetadataValue::Long(Values::One(_))
                | MetadataValue::Rational(Values::One(_))
                | MetadataValue::SLong(Values::One(_))
                | MetadataValue::SRational(Values::One(_))
        )
    }

    /// Packed little-endian representation, `count * element_size` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.count() * self.metadata_type().element_size());
        match self {
            MetadataValue::Byte(v) => out.extend_from_slice(v.as_slice()),
            MetadataValue::Ascii(v) | MetadataValue::Undefined(v) => out.extend_from_slice(v),
            MetadataValue::Short(v) => v
                .as_slice()
                .iter()
                .for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            MetadataValue::Long(v) => v
                .as_slice()
                .iter()
                .for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            MetadataValue::SLong(v) => v
                .as_slice()
                .iter()
                .for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            MetadataValue::Rational(v) => v.as_slice().iter().for_each(|r| {
                out.extend_from_slice(&r.num.to_le_bytes());
                out.extend_from_slice(&r.denom.to_le_bytes());
            }),
            MetadataValue::SRational(v) => v.as_slice().iter().for_each(|r| {
                out.extend_from_slice(&r.num.to_le_bytes());
                out.extend_from_slice(&r.denom.to_le_bytes());
            }),
        }
        out
    }

    /// Decode `count` packed little-endian elements of `ty` from `data`
    pub fn from_bytes(ty: MetadataType, count: usize, data: &[u8]) -> Result<Self> {
        if count == 0 {
            return Err(PostProcError::invalid("metadata value with zero elements"));
        }
        let needed = count
            .checked_mul(ty.element_size())
            .ok_or_else(|| PostProcError::invalid("metadata count overflow"))?;
        let data = data.get(..needed).ok_or_else(|| {
            PostProcError::invalid(format!(
                "metadata payload too short: {} < {}",
                data.len(),
                needed
            ))
        })?;

        match ty {
            MetadataType::Byte => Self::bytes(data),
            MetadataType::Ascii => Ok(MetadataValue::Ascii(copy_to_vec(data)?)),
            MetadataType::Undefined => Self::undefined(data),
            MetadataType::Short => {
                Self::shorts(&decode(data, 2, |c| u16::from_le_bytes([c[0], c[1]]))?)
            }
            MetadataType::Long => Self::longs(&decode(data, 4, le_u32)?),
            MetadataType::SLong => Self::slongs(&decode(data, 4, |c| le_u32(c) as i32)?),
            MetadataType::Rational => Self::rationals(&decode(data, 8, |c| Rational {
                num: le_u32(&c[..4]),
                denom: le_u32(&c[4..]),
            })?),
            MetadataType::SRational => Self::srationals(&decode(data, 8, |c| SRational {
                num: le_u32(&c[..4]) as i32,
                denom: le_u32(&c[4..]) as i32,
            })?),
        }
    }
}

/// One `(tag, value)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    pub tag: u32,
    pub value: MetadataValue,
}

/// Ordered, fixed-capacity metadata table
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataTable {
    entries: Vec<MetadataEntry>,
}

impl Default for MetadataTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_METADATA_ENTRIES),
        }
    }

    /// Append an entry. Fails with `OutOfMemory` once the table is full.
    pub fn add(&mut self, tag: u32, value: MetadataValue) -> Result<()> {
        self.check_room(tag)?;
        self.entries.push(MetadataEntry { tag, value });
        Ok(())
    }

    /// Append an entry decoded from packed little-endian bytes
    pub fn add_raw(&mut self, tag: u32, ty: MetadataType, count: usize, data: &[u8]) -> Result<()> {
        self.check_room(tag)?;
        let value = MetadataValue::from_bytes(ty, count, data)?;
        self.add(tag, value)
    }

    /// First entry with `tag`
    pub fn get(&self, tag: u32) -> Option<&MetadataValue> {
        self.entries.iter().find(|e| e.tag == tag).map(|e| &e.value)
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_METADATA_ENTRIES
    }

    fn check_room(&self, tag: u32) -> Result<()> {
        if self.is_full() {
            tracing::error!("Metadata table full, dropping tag 0x{:04X}", tag);
            return Err(PostProcError::OutOfMemory(format!(
                "metadata table holds at most {} entries",
                MAX_METADATA_ENTRIES
            )));
        }
        Ok(())
    }
}

fn copy_to_vec<T: Copy>(items: &[T]) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(items.len())?;
    v.extend_from_slice(items);
    Ok(v)
}

fn decode<T>(data: &[u8], size: usize, f: impl Fn(&[u8]) -> T) -> Result<Vec<T>> {
    let mut out = Vec::new();
    out.try_reserve_exact(data.len() / size)?;
    out.extend(data.chunks_exact(size).map(f));
    Ok(out)
}

fn le_u32(c: &[u8]) -> u32 {
    u32::from_le_bytes([c[0], c[1], c[2], c[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scalar_is_inline() {
        let v = MetadataValue::shorts(&[1]).unwrap();
        assert!(v.is_inline());
        assert_eq!(v, MetadataValue::Short(Values::One(1)));

        let v = MetadataValue::longs(&[1, 2, 3]).unwrap();
        assert!(!v.is_inline());
        assert_eq!(v.count(), 3);
    }

    #[test]
    fn test_ascii_and_undefined_always_heap() {
        assert!(!MetadataValue::ascii("Q").unwrap().is_inline());
        assert!(!MetadataValue::undefined(&[7]).unwrap().is_inline());
    }

    #[test]
    fn test_zero_count_rejected() {
        assert!(MetadataValue::longs(&[]).is_err());
        assert!(MetadataValue::from_bytes(MetadataType::Long, 0, &[]).is_err());
    }

    #[test]
    fn test_short_payload_rejected() {
        let err = MetadataValue::from_bytes(MetadataType::Long, 2, &[0; 7]).unwrap_err();
        assert!(matches!(err, PostProcError::InvalidArgument(_)));
    }

    #[test]
    fn test_table_capacity() {
        let mut table = MetadataTable::new();
        for tag in 0..MAX_METADATA_ENTRIES as u32 {
            table.add(tag, MetadataValue::longs(&[tag]).unwrap()).unwrap();
        }
        assert!(table.is_full());

        let err = table.add(0x9999, MetadataValue::bytes(&[1]).unwrap()).unwrap_err();
        assert!(matches!(err, PostProcError::OutOfMemory(_)));
        let err = table.add_raw(0x9999, MetadataType::Byte, 1, &[1]).unwrap_err();
        assert!(matches!(err, PostProcError::OutOfMemory(_)));
        assert_eq!(table.len(), MAX_METADATA_ENTRIES);
    }

    #[test]
    fn test_table_lookup_keeps_order() {
        let mut table = MetadataTable::new();
        table.add(0x010F, MetadataValue::ascii("QCOM").unwrap()).unwrap();
        table
            .add(
                0x829A,
                MetadataValue::rationals(&[Rational { num: 1, denom: 60 }]).unwrap(),
            )
            .unwrap();

        assert_eq!(table.entries()[0].tag, 0x010F);
        assert_eq!(table.get(0x010F).unwrap().to_bytes(), b"QCOM");
        assert_eq!(
            table.get(0x829A).unwrap().to_bytes(),
            vec![1, 0, 0, 0, 60, 0, 0, 0]
        );
        assert!(table.get(0x1234).is_none());
    }

    fn any_type() -> impl Strategy<Value = MetadataType> {
        prop_oneof![
            Just(MetadataType::Byte),
            Just(MetadataType::Ascii),
            Just(MetadataType::Short),
            Just(MetadataType::Long),
            Just(MetadataType::Rational),
            Just(MetadataType::Undefined),
            Just(MetadataType::SLong),
            Just(MetadataType::SRational),
        ]
    }

    proptest! {
        #[test]
        fn prop_packed_bytes_round_trip(
            ty in any_type(),
            count in 1usize..32,
            seed in proptest::collection::vec(any::<u8>(), 256),
        ) {
            let data = &seed[..count * ty.element_size()];
            let mut table = MetadataTable::new();
            table.add_raw(0x0100, ty, count, data).unwrap();

            let value = table.get(0x0100).unwrap();
            prop_assert_eq!(value.count(), count);
            prop_assert_eq!(value.metadata_type(), ty);
            prop_assert_eq!(value.to_bytes(), data.to_vec());

            let inline_expected = count == 1
                && !matches!(ty, MetadataType::Ascii | MetadataType::Undefined);
            prop_assert_eq!(value.is_inline(), inline_expected);
        }
    }
}
