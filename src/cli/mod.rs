pub mod args;

use clap::Parser;
pub use args::{Arguments, FsBackend, MapArguments};

pub fn parse() -> Arguments {
    Arguments::parse()
}

pub fn parse_map() -> MapArguments {
    MapArguments::parse()
}
