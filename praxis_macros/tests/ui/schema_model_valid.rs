use praxis::core::{SchemaModel as _, Serde, SchemaSerde};
use praxis::SchemaModel;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, SchemaModel)]
struct Plain {
    id: u64,
}

#[derive(Serialize, Deserialize, SchemaModel)]
#[schema(name = "payment.v2", validate = Payment::check)]
struct Payment {
    cents: i64,
}

impl Payment {
    fn check(&self) -> Result<(), String> {
        if self.cents <= 0 {
            return Err("amount must be positive".to_string());
        }
        Ok(())
    }
}

fn main() {
    assert_eq!(Plain::schema_name(), "Plain");
    assert!(Plain { id: 1 }.validate().is_ok());

    assert_eq!(Payment::schema_name(), "payment.v2");
    let serde = SchemaSerde::<Payment>::new();
    assert!(serde.deserialize(br#"{"cents": 250}"#).is_ok());
    assert!(serde.deserialize(br#"{"cents": -1}"#).is_err());
}
