//! Album records and lookup queries

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::validation::{json_type_name, Violation, ViolationReason};

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub price: f64,
}

impl Album {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            price,
        }
    }

    /// Build an album from an already validated payload.
    ///
    /// Undeclared fields are dropped. Anything that still cannot form an
    /// album (a contract looser than the record) is reported per field.
    pub fn from_payload(payload: &Value) -> std::result::Result<Self, Vec<Violation>> {
        let Some(object) = payload.as_object() else {
            return Err(vec![Violation::new(
                "",
                ViolationReason::NotAnObject {
                    found: json_type_name(payload).to_string(),
                },
            )]);
        };

        let mut violations = Vec::new();
        let id = text_field(object, "id", &mut violations);
        let title = text_field(object, "title", &mut violations);
        let artist = text_field(object, "artist", &mut violations);
        let price = price_field(object, &mut violations);

        match (id, title, artist, price) {
            (Some(id), Some(title), Some(artist), Some(price)) if violations.is_empty() => {
                Ok(Self::new(id, title, artist, price))
            }
            _ => Err(violations),
        }
    }

    /// Wire representation
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

impl fmt::Display for Album {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" by {} ({})", self.id, self.title, self.artist, self.price)
    }
}

fn text_field(
    object: &Map<String, Value>,
    name: &str,
    violations: &mut Vec<Violation>,
) -> Option<String> {
    match object.get(name) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            violations.push(Violation::new(
                name,
                ViolationReason::TypeMismatch {
                    expected: "string".to_string(),
                    found: json_type_name(other).to_string(),
                },
            ));
            None
        }
        None => {
            violations.push(Violation::new(name, ViolationReason::Missing));
            None
        }
    }
}

fn price_field(object: &Map<String, Value>, violations: &mut Vec<Violation>) -> Option<f64> {
    let Some(value) = object.get("price") else {
        violations.push(Violation::new("price", ViolationReason::Missing));
        return None;
    };
    match value.as_f64() {
        Some(price) if price >= 0.0 => Some(price),
        Some(_) => {
            let reason = ViolationReason::BelowMinimum { minimum: 0.0 };
            violations.push(Violation::new("price", reason));
            None
        }
        None => {
            violations.push(Violation::new(
                "price",
                ViolationReason::TypeMismatch {
                    expected: "number".to_string(),
                    found: json_type_name(value).to_string(),
                },
            ));
            None
        }
    }
}

/// Lookup where any supplied field may match.
///
/// Empty strings count as not supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl AlbumQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn by_artist(artist: impl Into<String>) -> Self {
        Self {
            artist: Some(artist.into()),
            ..Default::default()
        }
    }

    pub fn by_price(price: f64) -> Self {
        Self {
            price: Some(price),
            ..Default::default()
        }
    }

    fn supplied(field: &Option<String>) -> Option<&str> {
        field.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether no field was supplied
    pub fn is_empty(&self) -> bool {
        Self::supplied(&self.id).is_none()
            && Self::supplied(&self.title).is_none()
            && Self::supplied(&self.artist).is_none()
            && self.price.is_none()
    }

    /// The supplied fields as a payload for contract validation
    pub fn to_payload(&self) -> Value {
        let mut object = Map::new();
        for (name, field) in [("id", &self.id), ("title", &self.title), ("artist", &self.artist)] {
            if let Some(value) = Self::supplied(field) {
                object.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
        if let Some(price) = self.price {
            object.insert("price".to_string(), json!(price));
        }
        Value::Object(object)
    }

    /// True when ANY supplied field equals the album's field
    pub fn matches(&self, album: &Album) -> bool {
        Self::supplied(&self.id).map_or(false, |id| album.id == id)
            || Self::supplied(&self.title).map_or(false, |title| album.title == title)
            || Self::supplied(&self.artist).map_or(false, |artist| album.artist == artist)
            || self.price.map_or(false, |price| album.price == price)
    }
}

impl fmt::Display for AlbumQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = self.to_payload();
        let parts: Vec<String> = payload
            .as_object()
            .map(|object| object.iter().map(|(k, v)| format!("{}={}", k, v)).collect())
            .unwrap_or_default();
        if parts.is_empty() {
            f.write_str("(no fields)")
        } else {
            f.write_str(&parts.join(" or "))
        }
    }
}

/// Read album payloads from a JSON file holding an array
pub fn read_seed_file(path: impl AsRef<Path>) -> Result<Vec<Value>> {
    let content = fs::read_to_string(path)?;
    let payloads: Vec<Value> = serde_json::from_str(&content)?;
    Ok(payloads)
}

/// The three albums the catalog starts with
pub fn builtin_seed() -> Vec<Value> {
    vec![
        json!({ "id": "1", "title": "Clouds", "artist": "NF", "price": 56.0 }),
        json!({ "id": "2", "title": "Jeru", "artist": "Gerry", "price": 17.0 }),
        json!({ "id": "3", "title": "Real", "artist": "Olivia", "price": 39.0 }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload_drops_extra_fields() {
        let payload = json!({
            "id": "2", "title": "Jeru", "artist": "Gerry Mulligan", "price": 17.99,
            "label": "Capitol"
        });
        let album = Album::from_payload(&payload).unwrap();
        assert_eq!(album, Album::new("2", "Jeru", "Gerry Mulligan", 17.99));
        assert_eq!(
            album.to_value().unwrap(),
            json!({ "id": "2", "title": "Jeru", "artist": "Gerry Mulligan", "price": 17.99 })
        );
    }

    #[test]
    fn test_from_payload_reports_every_problem() {
        let violations = Album::from_payload(&json!({ "id": 2, "price": -1 })).unwrap_err();
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "title", "artist", "price"]);
    }

    #[test]
    fn test_query_matches_any_field() {
        let album = Album::new("1", "Clouds", "NF", 56.99);
        assert!(AlbumQuery::by_title("Clouds").matches(&album));
        assert!(AlbumQuery::by_price(56.99).matches(&album));

        let query = AlbumQuery {
            id: Some("99".to_string()),
            title: Some("Clouds".to_string()),
            artist: Some("Someone Else".to_string()),
            price: Some(1.0),
        };
        assert!(query.matches(&album));
    }

    #[test]
    fn test_empty_strings_are_not_supplied() {
        let album = Album::new("", "", "", 0.0);
        let query = AlbumQuery {
            id: Some(String::new()),
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(query.is_empty());
        assert!(!query.matches(&album));
        assert_eq!(query.to_payload(), json!({}));
    }

    #[test]
    fn test_query_display() {
        assert_eq!(AlbumQuery::by_artist("NF").to_string(), "artist=\"NF\"");
        assert_eq!(AlbumQuery::default().to_string(), "(no fields)");
    }

    #[test]
    fn test_builtin_seed_forms_albums() {
        let albums: Vec<Album> = builtin_seed()
            .iter()
            .map(|p| Album::from_payload(p).unwrap())
            .collect();
        assert_eq!(albums.len(), 3);
        assert_eq!(albums[0].title, "Clouds");
    }
}
