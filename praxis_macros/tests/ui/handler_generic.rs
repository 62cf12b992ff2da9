#[praxis::handler]
async fn echo<T>(_ctx: praxis::Context, value: T) -> Result<T, praxis::HandlerError> {
    Ok(value)
}

fn main() {}
