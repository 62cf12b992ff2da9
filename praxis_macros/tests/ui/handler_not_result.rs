#[praxis::handler]
async fn ping(_ctx: praxis::Context) -> u32 {
    1
}

fn main() {}
