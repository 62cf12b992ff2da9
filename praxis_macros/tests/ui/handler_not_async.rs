#[praxis::handler]
fn ping(_ctx: praxis::Context) -> Result<(), praxis::HandlerError> {
    Ok(())
}

fn main() {}
