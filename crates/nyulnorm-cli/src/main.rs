mod command;
mod image;
mod model;
mod util;

fn main() -> anyhow::Result<()> {
    command::run()
}
