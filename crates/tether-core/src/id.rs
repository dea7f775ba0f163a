use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use serde::{Deserialize, Serialize};

/// Declared type of the identifiers a reference field stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    ObjectId,
    String,
    Number,
    Binary,
    /// Any scalar usable as a key: object id, string, number or bytes.
    #[default]
    Any,
}

impl IdKind {
    /// Cast a raw field value to this kind.
    ///
    /// Returns `None` when the value cannot serve as an identifier of this
    /// kind (null, booleans, documents, unparseable strings, ...).
    pub fn cast(self, value: &Bson) -> Option<Bson> {
        match (self, value) {
            (IdKind::ObjectId, Bson::ObjectId(_)) => Some(value.clone()),
            (IdKind::ObjectId, Bson::String(s)) => ObjectId::parse_str(s).ok().map(Bson::ObjectId),

            (IdKind::String, Bson::String(_)) => Some(value.clone()),
            (IdKind::String, Bson::ObjectId(oid)) => Some(Bson::String(oid.to_hex())),
            (IdKind::String, Bson::Int32(i)) => Some(Bson::String(i.to_string())),
            (IdKind::String, Bson::Int64(i)) => Some(Bson::String(i.to_string())),

            (IdKind::Number, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => {
                Some(value.clone())
            }
            (IdKind::Number, Bson::String(s)) => s
                .parse::<i64>()
                .map(Bson::Int64)
                .or_else(|_| s.parse::<f64>().map(Bson::Double))
                .ok(),

            (IdKind::Binary, Bson::Binary(_)) => Some(value.clone()),
            (IdKind::Binary, Bson::String(s)) => Some(Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: s.as_bytes().to_vec(),
            })),

            (
                IdKind::Any,
                Bson::ObjectId(_)
                | Bson::String(_)
                | Bson::Int32(_)
                | Bson::Int64(_)
                | Bson::Double(_)
                | Bson::Binary(_),
            ) => Some(value.clone()),

            _ => None,
        }
    }
}

/// Hashable, comparable form of an identifier.
///
/// Integers and integral doubles share one representation so `2359`,
/// `2359i64` and `2359.0` address the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdKey {
    ObjectId([u8; 12]),
    String(String),
    Int(i64),
    Double(u64),
    Binary(Vec<u8>),
}

impl IdKey {
    pub fn of(value: &Bson) -> Option<Self> {
        Some(match value {
            Bson::ObjectId(oid) => IdKey::ObjectId(oid.bytes()),
            Bson::String(s) => IdKey::String(s.clone()),
            Bson::Int32(i) => IdKey::Int(i64::from(*i)),
            Bson::Int64(i) => IdKey::Int(*i),
            Bson::Double(d) => {
                if d.fract() == 0.0 && d.abs() < i64::MAX as f64 {
                    IdKey::Int(*d as i64)
                } else {
                    IdKey::Double(d.to_bits())
                }
            }
            Bson::Binary(b) => IdKey::Binary(b.bytes.clone()),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_from_hex_string() {
        let oid = ObjectId::new();
        let cast = IdKind::ObjectId.cast(&Bson::String(oid.to_hex()));
        assert_eq!(cast, Some(Bson::ObjectId(oid)));
        assert_eq!(IdKind::ObjectId.cast(&Bson::String("nope".into())), None);
    }

    #[test]
    fn binary_from_string() {
        let cast = IdKind::Binary.cast(&Bson::String("alice".into())).unwrap();
        assert_eq!(IdKey::of(&cast), Some(IdKey::Binary(b"alice".to_vec())));
    }

    #[test]
    fn numbers_share_keys() {
        assert_eq!(IdKey::of(&Bson::Int32(2359)), IdKey::of(&Bson::Int64(2359)));
        assert_eq!(IdKey::of(&Bson::Double(2359.0)), IdKey::of(&Bson::Int64(2359)));
        assert_ne!(IdKey::of(&Bson::Double(2.5)), IdKey::of(&Bson::Int64(2)));
    }

    #[test]
    fn non_identifiers_rejected() {
        assert_eq!(IdKind::Any.cast(&Bson::Null), None);
        assert_eq!(IdKind::Any.cast(&Bson::Boolean(true)), None);
        assert_eq!(IdKey::of(&Bson::Boolean(true)), None);
    }
}
