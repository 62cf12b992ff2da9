struct Greeter;

impl Greeter {
    #[praxis::handler]
    async fn greet(&self, _ctx: praxis::Context) -> Result<(), praxis::HandlerError> {
        Ok(())
    }
}

fn main() {
    let _ = Greeter;
}
