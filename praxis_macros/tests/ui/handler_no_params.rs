#[praxis::handler]
async fn ping() -> Result<(), praxis::HandlerError> {
    Ok(())
}

fn main() {}
