//! Schema inference from sampled documents.
//!
//! Every field maps to the BSON types observed for it, in first-seen order.
//! Embedded documents carry their own `fields` and arrays carry the `types`
//! of their elements, so the shape of nested data is kept.

use bson::{Bson, Document};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

#[derive(Debug, Default)]
struct Fields(IndexMap<String, Types>);

#[derive(Debug, Default)]
struct Types(IndexMap<String, Shape>);

#[derive(Debug, Default)]
struct Shape {
    fields: Option<Fields>,
    items: Option<Types>,
}

impl Fields {
    fn add(&mut self, document: &Document) {
        for (key, value) in document {
            self.0.entry(key.clone()).or_default().add(value);
        }
    }

    fn to_json(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(key, types)| (key.clone(), json!({ "types": types.to_json() })))
            .collect()
    }
}

impl Types {
    fn add(&mut self, value: &Bson) {
        let shape = self.0.entry(bson_type_name(value)).or_default();
        match value {
            Bson::Document(document) => shape.fields.get_or_insert_with(Fields::default).add(document),
            Bson::Array(items) => {
                let types = shape.items.get_or_insert_with(Types::default);
                for item in items {
                    types.add(item);
                }
            }
            _ => {}
        }
    }

    fn to_json(&self) -> Value {
        self.0
            .iter()
            .map(|(name, shape)| {
                let mut entry = json!({ "bsonType": name });
                if let Some(fields) = &shape.fields {
                    entry["fields"] = Value::Object(fields.to_json());
                }
                if let Some(items) = &shape.items {
                    entry["types"] = items.to_json();
                }
                entry
            })
            .collect()
    }
}

/// Name of the BSON type of `value`.
#[must_use]
pub fn bson_type_name(value: &Bson) -> String {
    let name = match value {
        Bson::Double(_) => "Double",
        Bson::String(_) => "String",
        Bson::Document(_) => "Document",
        Bson::Array(_) => "Array",
        Bson::Boolean(_) => "Boolean",
        Bson::Null => "Null",
        Bson::Int32(_) => "Int32",
        Bson::Int64(_) => "Long",
        Bson::Decimal128(_) => "Decimal128",
        Bson::ObjectId(_) => "ObjectId",
        Bson::DateTime(_) => "Date",
        Bson::Binary(_) => "Binary",
        Bson::Timestamp(_) => "Timestamp",
        Bson::RegularExpression(_) => "RegExp",
        other => return format!("{:?}", other.element_type()),
    };
    name.to_string()
}

/// Infers the field types of `documents`.
///
/// Returns an empty map when there are no documents.
#[must_use]
pub fn infer_schema(documents: &[Document]) -> Map<String, Value> {
    let mut fields = Fields::default();
    for document in documents {
        fields.add(document);
    }
    fields.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    use bson::doc;

    #[test]
    fn collects_every_observed_type_in_order() {
        let schema = infer_schema(&[
            doc! { "_id": 1, "name": "Ada" },
            doc! { "_id": 2_i64, "name": Bson::Null, "age": 36.5 },
        ]);

        let keys: Vec<_> = schema.keys().cloned().collect();
        assert_eq!(keys, ["_id", "name", "age"]);
        assert_eq!(
            schema["_id"]["types"],
            json!([{ "bsonType": "Int32" }, { "bsonType": "Long" }])
        );
        assert_eq!(
            schema["name"]["types"],
            json!([{ "bsonType": "String" }, { "bsonType": "Null" }])
        );
    }

    #[test]
    fn nested_documents_and_arrays_keep_their_shape() {
        let schema = infer_schema(&[doc! {
            "address": { "city": "Lyon", "zip": 69001 },
            "tags": ["a", 1],
        }]);

        assert_eq!(
            schema["address"]["types"][0]["fields"]["city"]["types"],
            json!([{ "bsonType": "String" }])
        );
        assert_eq!(
            schema["tags"]["types"],
            json!([{
                "bsonType": "Array",
                "types": [{ "bsonType": "String" }, { "bsonType": "Int32" }]
            }])
        );
    }

    #[test]
    fn no_documents_means_no_fields() {
        assert!(infer_schema(&[]).is_empty());
    }
}
