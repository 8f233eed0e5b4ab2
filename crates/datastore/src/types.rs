//! Type coercion between the types fields are declared with and the handful of kinds sqlite stores.
//!
//! There are three layers:
//!
//! - [TypeTag]/[DeclaredType]: what a field is declared as.  Declarations may be unions, but only unions which are
//!   "optional of exactly one tag" resolve.
//! - [FieldValue]: a native value, as records hold them.
//! - [StorageValue]: what actually crosses into sqlite: text, integer, real, or null.
//!
//! Booleans are stored as integers and timestamps as text in the canonical encoding (see [format_timestamp]).  Going
//! native -> storage -> native must give back exactly the value we started with.
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use time::PrimitiveDateTime;

use crate::errors::*;

/// The five types a field may be declared as.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeTag {
    Text,
    Integer,
    Real,
    Boolean,
    Timestamp,
}

/// The kinds of value sqlite understands natively.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StorageKind {
    Text,
    Integer,
    Real,
    Null,
}

/// A type as application code declares it, before resolution.
///
/// `Optional<T>` is spelled as the union of `T` and the none type, see [DeclaredType::optional].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeclaredType {
    Tag(TypeTag),
    NoneType,
    Union(Vec<DeclaredType>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum StorageValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

/// A native field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Timestamp(PrimitiveDateTime),
    /// The value of an optional field which isn't set.
    Absent,
}

impl TypeTag {
    pub fn storage_kind(&self) -> StorageKind {
        match self {
            TypeTag::Text => StorageKind::Text,
            TypeTag::Integer => StorageKind::Integer,
            TypeTag::Real => StorageKind::Real,
            TypeTag::Boolean => StorageKind::Integer,
            TypeTag::Timestamp => StorageKind::Text,
        }
    }
}

impl StorageKind {
    /// The column type used in `CREATE TABLE`.
    pub fn sql_type(&self) -> &'static str {
        match self {
            StorageKind::Text => "TEXT",
            StorageKind::Integer => "INTEGER",
            StorageKind::Real => "REAL",
            StorageKind::Null => "NULL",
        }
    }
}

impl DeclaredType {
    pub fn optional(tag: TypeTag) -> Self {
        DeclaredType::Union(vec![DeclaredType::Tag(tag), DeclaredType::NoneType])
    }
}

impl From<TypeTag> for DeclaredType {
    fn from(tag: TypeTag) -> Self {
        DeclaredType::Tag(tag)
    }
}

/// Collapse a declared type to `(tag, optional)`.
///
/// Fails for the bare none type, for unions of more than one tag, and for optionals whose inner type isn't a plain tag
/// (this is what rules out optional-of-optional).
pub fn resolve_declared_type(declared: &DeclaredType) -> Result<(TypeTag, bool)> {
    match declared {
        DeclaredType::Tag(t) => Ok((*t, false)),
        DeclaredType::NoneType => unsupported!("the none type can't be the type of a field on its own"),
        DeclaredType::Union(members) => {
            let has_none = members.iter().any(|m| *m == DeclaredType::NoneType);
            let rest = members
                .iter()
                .filter(|m| **m != DeclaredType::NoneType)
                .collect::<Vec<_>>();

            if rest.len() != 1 {
                unsupported!("unexpected multiple types in union: {:?}", members);
            }

            match (rest[0], has_none) {
                (DeclaredType::Tag(t), true) => Ok((*t, true)),
                // A single-member union is just that member.
                (inner, false) => resolve_declared_type(inner),
                (inner, true) => unsupported!("optional of {:?} isn't supported", inner),
            }
        }
    }
}

pub fn native_type_to_storage_kind(declared: &DeclaredType) -> Result<(StorageKind, bool)> {
    let (tag, optional) = resolve_declared_type(declared)?;
    Ok((tag.storage_kind(), optional))
}

/// Encode a timestamp in the canonical text form: `YYYY-MM-DDTHH:MM:SS[.f]`, no offset.
///
/// Whole seconds have no fractional part.  Otherwise the fraction uses as few digits as represent the value exactly,
/// so encoding never loses precision.
pub fn format_timestamp(ts: &PrimitiveDateTime) -> Result<String> {
    let formatted = if ts.nanosecond() == 0 {
        ts.format(time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
    } else {
        ts.format(time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"
        ))
    };
    formatted.map_err(|e| Error::UnsupportedType(format!("timestamp {} isn't encodable: {}", ts, e)))
}

/// Parse the canonical timestamp encoding.  The fractional seconds are optional.
pub fn parse_timestamp(text: &str) -> Result<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        text,
        time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
        ),
    )
    .map_err(|source| Error::InvalidFormat {
        value: text.to_string(),
        source,
    })
}

/// Convert a native value to what we hand sqlite, checking it against the field's declared tag.
pub fn native_value_to_storage(value: &FieldValue, declared: TypeTag) -> Result<StorageValue> {
    Ok(match (value, declared) {
        (FieldValue::Absent, _) => StorageValue::Null,
        (FieldValue::Boolean(b), TypeTag::Boolean) => StorageValue::Integer(*b as i64),
        (FieldValue::Timestamp(ts), TypeTag::Timestamp) => StorageValue::Text(format_timestamp(ts)?),
        (FieldValue::Text(s), TypeTag::Text) => StorageValue::Text(s.clone()),
        (FieldValue::Integer(i), TypeTag::Integer) => StorageValue::Integer(*i),
        (FieldValue::Real(f), TypeTag::Real) => {
            if !f.is_finite() {
                unsupported!("non-finite real {} has no storage representation", f);
            }
            StorageValue::Real(*f)
        }
        (v, t) => unsupported!("{} value can't be stored in a {:?} field", v.kind_name(), t),
    })
}

/// Convert a stored value back to the native value for a field.
pub fn storage_to_native(raw: StorageValue, declared: TypeTag, optional: bool) -> Result<FieldValue> {
    Ok(match (raw, declared) {
        (StorageValue::Null, _) if optional => FieldValue::Absent,
        (StorageValue::Null, t) => unsupported!("got NULL for a non-optional {:?} field", t),
        (StorageValue::Text(s), TypeTag::Text) => FieldValue::Text(s),
        (StorageValue::Integer(i), TypeTag::Integer) => FieldValue::Integer(i),
        (StorageValue::Real(f), TypeTag::Real) => FieldValue::Real(f),
        (StorageValue::Integer(i), TypeTag::Real) => FieldValue::Real(i as f64),
        (StorageValue::Text(s), TypeTag::Timestamp) => FieldValue::Timestamp(parse_timestamp(&s)?),
        (StorageValue::Integer(i), TypeTag::Boolean) => FieldValue::Boolean(i != 0),
        (raw, t) => unsupported!("no conversion from stored {:?} to {:?}", raw, t),
    })
}

impl FieldValue {
    /// The tag this value would naturally be declared as, or `None` for [FieldValue::Absent].
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            FieldValue::Text(_) => Some(TypeTag::Text),
            FieldValue::Integer(_) => Some(TypeTag::Integer),
            FieldValue::Real(_) => Some(TypeTag::Real),
            FieldValue::Boolean(_) => Some(TypeTag::Boolean),
            FieldValue::Timestamp(_) => Some(TypeTag::Timestamp),
            FieldValue::Absent => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Real(_) => "real",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Absent => "absent",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }
}

impl StorageValue {
    pub fn kind(&self) -> StorageKind {
        match self {
            StorageValue::Text(_) => StorageKind::Text,
            StorageValue::Integer(_) => StorageKind::Integer,
            StorageValue::Real(_) => StorageKind::Real,
            StorageValue::Null => StorageKind::Null,
        }
    }

    /// Render as an sqlite literal.
    ///
    /// Text is single-quoted with embedded quotes doubled.  Reals use the shortest form which parses back to the same
    /// `f64`.
    pub fn to_literal(&self) -> String {
        match self {
            StorageValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            StorageValue::Integer(i) => i.to_string(),
            StorageValue::Real(f) => format!("{:?}", f),
            StorageValue::Null => "NULL".to_string(),
        }
    }
}

impl rusqlite::ToSql for StorageValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            StorageValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            StorageValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            StorageValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            StorageValue::Null => ToSqlOutput::Owned(Value::Null),
        })
    }
}

impl TryFrom<ValueRef<'_>> for StorageValue {
    type Error = Error;

    fn try_from(value: ValueRef<'_>) -> Result<Self> {
        Ok(match value {
            ValueRef::Null => StorageValue::Null,
            ValueRef::Integer(i) => StorageValue::Integer(i),
            ValueRef::Real(f) => StorageValue::Real(f),
            ValueRef::Text(t) => StorageValue::Text(
                std::str::from_utf8(t)
                    .map_err(|e| Error::UnsupportedType(format!("stored text isn't utf-8: {}", e)))?
                    .to_string(),
            ),
            ValueRef::Blob(_) => unsupported!("blobs aren't a supported storage kind"),
        })
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<PrimitiveDateTime> for FieldValue {
    fn from(v: PrimitiveDateTime) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(x) => x.into(),
            None => FieldValue::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use time::macros::datetime;

    const ALL_TAGS: [TypeTag; 5] = [
        TypeTag::Text,
        TypeTag::Integer,
        TypeTag::Real,
        TypeTag::Boolean,
        TypeTag::Timestamp,
    ];

    #[test]
    fn test_storage_kinds() {
        let expected = [
            StorageKind::Text,
            StorageKind::Integer,
            StorageKind::Real,
            StorageKind::Integer,
            StorageKind::Text,
        ];

        for (tag, kind) in ALL_TAGS.iter().zip(expected.iter()) {
            assert_eq!(
                native_type_to_storage_kind(&(*tag).into()).unwrap(),
                (*kind, false)
            );
            assert_eq!(
                native_type_to_storage_kind(&DeclaredType::optional(*tag)).unwrap(),
                (*kind, true)
            );
        }
    }

    #[test]
    fn test_rejected_declarations() {
        let multi = DeclaredType::Union(vec![
            TypeTag::Integer.into(),
            TypeTag::Text.into(),
            DeclaredType::NoneType,
        ]);
        let nested = DeclaredType::Union(vec![
            DeclaredType::optional(TypeTag::Integer),
            DeclaredType::NoneType,
        ]);

        for d in [
            multi,
            nested,
            DeclaredType::NoneType,
            DeclaredType::Union(vec![]),
        ] {
            assert!(
                matches!(native_type_to_storage_kind(&d), Err(Error::UnsupportedType(_))),
                "{:?} should be rejected",
                d
            );
        }
    }

    #[test]
    fn test_union_of_one() {
        let d = DeclaredType::Union(vec![TypeTag::Real.into()]);
        assert_eq!(resolve_declared_type(&d).unwrap(), (TypeTag::Real, false));
    }

    #[test]
    fn test_native_to_storage() {
        let ts = datetime!(2022-03-04 05:06:07.25);
        assert_eq!(
            native_value_to_storage(&true.into(), TypeTag::Boolean).unwrap(),
            StorageValue::Integer(1)
        );
        assert_eq!(
            native_value_to_storage(&false.into(), TypeTag::Boolean).unwrap(),
            StorageValue::Integer(0)
        );
        assert_eq!(
            native_value_to_storage(&ts.into(), TypeTag::Timestamp).unwrap(),
            StorageValue::Text("2022-03-04T05:06:07.25".into())
        );
        assert_eq!(
            native_value_to_storage(&FieldValue::Absent, TypeTag::Integer).unwrap(),
            StorageValue::Null
        );
        assert!(matches!(
            native_value_to_storage(&"5".into(), TypeTag::Integer),
            Err(Error::UnsupportedType(_))
        ));
        assert!(matches!(
            native_value_to_storage(&f64::NAN.into(), TypeTag::Real),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_storage_to_native() {
        assert_eq!(
            storage_to_native(StorageValue::Integer(7), TypeTag::Boolean, false).unwrap(),
            FieldValue::Boolean(true)
        );
        assert_eq!(
            storage_to_native(StorageValue::Null, TypeTag::Text, true).unwrap(),
            FieldValue::Absent
        );
        // Falsy-looking values of optional fields are still values.
        assert_eq!(
            storage_to_native(StorageValue::Integer(0), TypeTag::Integer, true).unwrap(),
            FieldValue::Integer(0)
        );
        assert_eq!(
            storage_to_native(StorageValue::Text("".into()), TypeTag::Text, true).unwrap(),
            FieldValue::Text("".into())
        );
        assert_eq!(
            storage_to_native(StorageValue::Text("2021-01-02T03:04:05".into()), TypeTag::Timestamp, false)
                .unwrap(),
            FieldValue::Timestamp(datetime!(2021-01-02 03:04:05))
        );
        assert_eq!(
            storage_to_native(
                StorageValue::Text("2021-01-02T03:04:05.123456".into()),
                TypeTag::Timestamp,
                false
            )
            .unwrap(),
            FieldValue::Timestamp(datetime!(2021-01-02 03:04:05.123456))
        );
    }

    #[test]
    fn test_storage_to_native_failures() {
        assert!(matches!(
            storage_to_native(StorageValue::Text("yesterday".into()), TypeTag::Timestamp, true),
            Err(Error::InvalidFormat { .. })
        ));
        assert!(matches!(
            storage_to_native(StorageValue::Null, TypeTag::Integer, false),
            Err(Error::UnsupportedType(_))
        ));
        assert!(matches!(
            storage_to_native(StorageValue::Text("1".into()), TypeTag::Integer, false),
            Err(Error::UnsupportedType(_))
        ));
        assert!(matches!(
            storage_to_native(StorageValue::Real(1.0), TypeTag::Boolean, false),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_literals() {
        assert_eq!(StorageValue::Text("it's".into()).to_literal(), "'it''s'");
        assert_eq!(StorageValue::Integer(-3).to_literal(), "-3");
        assert_eq!(StorageValue::Real(1.0).to_literal(), "1.0");
        assert_eq!(StorageValue::Real(0.1).to_literal(), "0.1");
        assert_eq!(StorageValue::Null.to_literal(), "NULL");
    }

    fn arb_timestamp() -> impl Strategy<Value = PrimitiveDateTime> {
        (0i64..253_402_300_799, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
            let odt = time::OffsetDateTime::from_unix_timestamp(secs).unwrap();
            let t = odt.time();
            let t = time::Time::from_hms_nano(t.hour(), t.minute(), t.second(), nanos).unwrap();
            PrimitiveDateTime::new(odt.date(), t)
        })
    }

    fn arb_value(tag: TypeTag) -> BoxedStrategy<FieldValue> {
        match tag {
            TypeTag::Text => any::<String>().prop_map(FieldValue::Text).boxed(),
            TypeTag::Integer => any::<i64>().prop_map(FieldValue::Integer).boxed(),
            TypeTag::Real => proptest::num::f64::NORMAL
                .prop_map(FieldValue::Real)
                .boxed(),
            TypeTag::Boolean => any::<bool>().prop_map(FieldValue::Boolean).boxed(),
            TypeTag::Timestamp => arb_timestamp().prop_map(FieldValue::Timestamp).boxed(),
        }
    }

    fn arb_tagged_value() -> impl Strategy<Value = (TypeTag, bool, FieldValue)> {
        (0..ALL_TAGS.len(), any::<bool>(), any::<bool>()).prop_flat_map(|(i, optional, absent)| {
            let tag = ALL_TAGS[i];
            if optional && absent {
                Just((tag, optional, FieldValue::Absent)).boxed()
            } else {
                arb_value(tag).prop_map(move |v| (tag, optional, v)).boxed()
            }
        })
    }

    proptest! {
        #[test]
        fn round_trips((tag, optional, value) in arb_tagged_value()) {
            let stored = native_value_to_storage(&value, tag).unwrap();
            if !optional {
                prop_assert_ne!(&stored, &StorageValue::Null);
            }
            prop_assert_eq!(stored.kind(), if value.is_absent() { StorageKind::Null } else { tag.storage_kind() });
            let back = storage_to_native(stored, tag, optional).unwrap();
            prop_assert_eq!(back, value);
        }
    }
}
