#[praxis::handler]
async fn add(_ctx: praxis::Context, a: u32, b: u32) -> Result<u32, praxis::HandlerError> {
    Ok(a + b)
}

fn main() {}
