use std::error;
use std::fmt;
use std::fs;
use std::io;

extern crate regex;
extern crate reqwest;
extern crate ripemd;
extern crate serde_json;
extern crate sha2;

pub mod diff;
pub mod frontend;
pub mod portfile;

use diff::PackageDiff;
use frontend::Frontend;

#[derive(Debug)]
pub enum Error {
    UnsupportedFrontend(String),
    VersionNotFound(String),
    Frontend(String),
    Http(reqwest::Error),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnsupportedFrontend(ref ecosystem) => {
                write!(f, "Unsupported frontend: {}", ecosystem)
            }
            Error::VersionNotFound(ref package) => {
                write!(f, "Could not find current version for {}", package)
            }
            Error::Frontend(ref message) => write!(f, "{}", message),
            Error::Http(ref e) => write!(f, "{}", e),
            Error::Io(ref e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Http(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// Where the rewritten Portfile goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteTarget {
    InPlace,
    NewFile,
    Stdout,
}

/// Upgrades the Portfile of `package` to the latest release known to the
/// frontend. The Portfile location follows the frontend's path
/// convention, relative to the current directory.
pub fn update_port(
    frontend: &dyn Frontend,
    package: &str,
    write_target: WriteTarget,
    unsafe_file_updates: bool,
) -> Result<(), Error> {
    let path = frontend.portfile_path(package);
    update_port_at(frontend, package, &path, write_target, unsafe_file_updates)
}

fn update_port_at(
    frontend: &dyn Frontend,
    package: &str,
    path: &str,
    write_target: WriteTarget,
    unsafe_file_updates: bool,
) -> Result<(), Error> {
    let contents = fs::read_to_string(path)?;

    let old_version = match frontend.find_version(&contents) {
        Some(version) => version,
        None => return Err(Error::VersionNotFound(package.to_string())),
    };
    println!(
        "[+] Updating {} (currently at version {})",
        package, old_version
    );

    let old = frontend.parse(package, Some(&old_version))?;
    let new = frontend.parse(package, None)?;
    if old.version == new.version {
        println!("{} is already at the latest version", package);
        return Ok(());
    }

    let diff = PackageDiff::new(&old, &new);
    for requirement in diff.new_requirements() {
        println!(
            "\tAdding dependency: {}",
            frontend.format_requirement(requirement)
        );
    }
    for requirement in diff.deleted_requirements() {
        println!(
            "\tRemoving dependency: {}",
            frontend.format_requirement(requirement)
        );
    }

    let archive = frontend.archive(&new)?;
    let (new_contents, found_block) =
        portfile::update_portfile(&contents, frontend, &diff, &archive);
    if !found_block && !diff.new_requirements().is_empty() {
        println!(
            "** Warning: no dependency block in {}, new dependencies were not added",
            path
        );
    }

    match write_target {
        WriteTarget::InPlace => {
            if !unsafe_file_updates {
                let path_old = path.to_string() + ".old";
                let _ = fs::remove_file(&path_old);
                fs::copy(path, &path_old)?;
            }
            fs::write(path, new_contents)?;
        }
        WriteTarget::NewFile => {
            let path_new = path.to_string() + ".new";
            fs::write(&path_new, new_contents)?;
            println!("Wrote {}", path_new);
        }
        WriteTarget::Stdout => {
            print!("{}", new_contents);
        }
    }
    Ok(())
}
