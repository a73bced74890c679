mod application;
mod presentation;

use shrink_core::error::Result;

fn main() -> Result<()> {
    application::run()
}
