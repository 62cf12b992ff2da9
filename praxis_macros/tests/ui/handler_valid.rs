use praxis::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, SchemaModel)]
struct Order {
    quantity: u32,
}

#[handler]
async fn ping(_ctx: Context) -> Result<(), HandlerError> {
    Ok(())
}

#[handler]
async fn place(_ctx: Context, order: Order) -> Result<u32, TerminalError> {
    Ok(order.quantity)
}

#[handler]
pub async fn echo(_ctx: Context, message: Vec<String>) -> std::result::Result<Vec<String>, HandlerError> {
    Ok(message)
}

fn main() {
    let ping = ping_handler();
    assert_eq!(ping.name(), Some("ping"));
    assert_eq!(ping.parameters().len(), 1);

    let place = place_handler();
    assert!(place.input_type().is_structured_schema());
    assert!(!place.output_type().is_structured_schema());
    assert_eq!(place.parameters()[1].name(), "order");
    assert_eq!(place.parameters()[1].annotation(), Some("Order"));

    let echo = echo_handler();
    assert_eq!(echo.parameters()[1].annotation(), Some("Vec<String>"));
}
