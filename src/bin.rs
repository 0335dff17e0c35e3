extern crate libpfr;

use std::error;

extern crate structopt;
use structopt::StructOpt;

use libpfr::frontend::frontend_for;
use libpfr::WriteTarget;

#[derive(StructOpt)]
#[structopt(
    name = "portfile-refresh",
    about = "A MacPorts Portfile upstream-release updater."
)]
struct Opt {
    /// Package index to query ("pypi" or "rubygems").
    ecosystem: String,

    /// Name of the package whose Portfile should be updated.
    package: String,

    #[structopt(short = "u", long = "unsafe-file-updates")]
    unsafe_file_updates: bool,

    /// Write the result to Portfile.new instead of updating in place.
    #[structopt(short = "n", long = "new-file", conflicts_with = "print")]
    new_file: bool,

    /// Print the result to stdout instead of updating in place.
    #[structopt(short = "p", long = "print")]
    print: bool,
}

fn main() -> Result<(), Box<dyn error::Error>> {
    let opt = Opt::from_args();

    let frontend = frontend_for(&opt.ecosystem)?;
    let write_target = if opt.new_file {
        WriteTarget::NewFile
    } else if opt.print {
        WriteTarget::Stdout
    } else {
        WriteTarget::InPlace
    };

    libpfr::update_port(
        frontend.as_ref(),
        &opt.package,
        write_target,
        opt.unsafe_file_updates,
    )?;
    Ok(())
}
