mod gui;

use std::error::Error;

use clap::Parser;
use gui::{engage_gui, App};
use myosync::args::MonitorArgs;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = MonitorArgs::parse();

    let config = args.acquisition.load()?;
    config.validate()?;

    engage_gui(App::new(config, args.dummy))
}
