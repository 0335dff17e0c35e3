use std::collections::HashMap;

use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::USER_AGENT;
use ripemd::Ripemd160;
use serde_json::Value;
use sha2::{Digest, Sha256};

use Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub name: String,
    pub specifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub requirements: HashMap<String, Vec<Requirement>>,
    pub archive_url: Option<String>,
}

impl Package {
    pub fn requirements_for(&self, phase: &str) -> &[Requirement] {
        self.requirements
            .get(phase)
            .map(|requirements| requirements.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    pub rmd160: String,
    pub sha256: String,
    pub size: u64,
}

pub trait Frontend {
    fn portfile_path(&self, package: &str) -> String;

    fn format_requirement(&self, requirement: &Requirement) -> String;

    fn extract_version(&self, line: &str) -> Option<String>;

    fn rewrite_version_line(&self, line: &str, version: &str) -> Option<String>;

    fn find_version(&self, portfile: &str) -> Option<String> {
        for line in portfile.lines() {
            if let Some(version) = self.extract_version(line) {
                return Some(version);
            }
        }
        None
    }

    fn parse(&self, package: &str, version: Option<&str>) -> Result<Package, Error>;

    fn archive(&self, package: &Package) -> Result<Archive, Error> {
        match package.archive_url {
            Some(ref uri) => fetch_archive(uri),
            None => Err(Error::Frontend(format!(
                "no release archive listed for {} {}",
                package.name, package.version
            ))),
        }
    }
}

pub fn frontend_for(ecosystem: &str) -> Result<Box<dyn Frontend>, Error> {
    match ecosystem {
        "pypi" => Ok(Box::new(PyPiFrontend::new())),
        "rubygems" => Ok(Box::new(RubyGemsFrontend::new())),
        _ => Err(Error::UnsupportedFrontend(ecosystem.to_string())),
    }
}

#[test]
fn test_frontend_for() {
    assert!(frontend_for("pypi").is_ok());
    assert!(frontend_for("rubygems").is_ok());
    assert!(frontend_for("npm").is_err());
}

pub struct PyPiFrontend {
    version_re: Regex,
}

impl PyPiFrontend {
    pub fn new() -> PyPiFrontend {
        PyPiFrontend {
            version_re: Regex::new(r"^(version\s+)(.*)$").unwrap(),
        }
    }
}

impl Frontend for PyPiFrontend {
    fn portfile_path(&self, package: &str) -> String {
        format!("python/py-{}/Portfile", package.to_lowercase())
    }

    fn format_requirement(&self, requirement: &Requirement) -> String {
        format!(
            "port:py${{python.version}}-{}",
            requirement.name.to_lowercase()
        )
    }

    fn extract_version(&self, line: &str) -> Option<String> {
        self.version_re
            .captures(line)
            .map(|caps| caps[2].to_string())
    }

    fn rewrite_version_line(&self, line: &str, version: &str) -> Option<String> {
        self.version_re
            .captures(line)
            .map(|caps| format!("{}{}", &caps[1], version))
    }

    fn parse(&self, package: &str, version: Option<&str>) -> Result<Package, Error> {
        let uri = match version {
            Some(version) => format!("https://pypi.org/pypi/{}/{}/json", package, version),
            None => format!("https://pypi.org/pypi/{}/json", package),
        };
        let json_doc = fetch_json(&uri)?;
        parse_pypi_json(&json_doc)
    }
}

fn parse_pypi_json(json_doc: &Value) -> Result<Package, Error> {
    let info = &json_doc["info"];
    let name = match info["name"].as_str() {
        Some(name) => name.to_string(),
        None => {
            return Err(Error::Frontend(
                "package name missing from PyPI metadata".to_string(),
            ))
        }
    };
    let version = match info["version"].as_str() {
        Some(version) => version.to_string(),
        None => {
            return Err(Error::Frontend(format!(
                "no version in PyPI metadata for {}",
                name
            )))
        }
    };

    let mut run = Vec::new();
    if let Some(requires_dist) = info["requires_dist"].as_array() {
        for entry in requires_dist {
            if let Some(requirement) = entry.as_str().and_then(parse_requires_dist) {
                run.push(requirement);
            }
        }
    }
    let mut requirements = HashMap::new();
    requirements.insert("run".to_string(), run);

    let archive_url = sdist_url(&json_doc["urls"]);

    Ok(Package {
        name,
        version,
        requirements,
        archive_url,
    })
}

fn sdist_url(urls: &Value) -> Option<String> {
    let urls = urls.as_array()?;
    let entry = urls
        .iter()
        .find(|entry| entry["packagetype"] == "sdist")
        .or_else(|| urls.first())?;
    entry["url"].as_str().map(|uri| uri.to_string())
}

fn parse_requires_dist(entry: &str) -> Option<Requirement> {
    let (requirement, marker) = match entry.find(';') {
        Some(pos) => (&entry[..pos], &entry[pos + 1..]),
        None => (entry, ""),
    };
    // Entries gated behind an extra marker are not run dependencies.
    if marker.contains("extra") {
        return None;
    }

    let requirement_re =
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*\(?([^)]*)\)?$").unwrap();
    let caps = requirement_re.captures(requirement.trim())?;
    let specifier = caps[2].trim();
    Some(Requirement {
        name: caps[1].to_string(),
        specifier: if specifier.is_empty() {
            None
        } else {
            Some(specifier.to_string())
        },
    })
}

#[test]
fn test_parse_requires_dist() {
    assert_eq!(
        parse_requires_dist("chardet (<4,>=3.0.2)"),
        Some(Requirement {
            name: "chardet".to_string(),
            specifier: Some("<4,>=3.0.2".to_string()),
        })
    );
    assert_eq!(
        parse_requires_dist("idna>=2.5"),
        Some(Requirement {
            name: "idna".to_string(),
            specifier: Some(">=2.5".to_string()),
        })
    );
    assert_eq!(
        parse_requires_dist("zope.interface"),
        Some(Requirement {
            name: "zope.interface".to_string(),
            specifier: None,
        })
    );
    assert_eq!(
        parse_requires_dist("requests[security] (>=2.0)"),
        Some(Requirement {
            name: "requests".to_string(),
            specifier: Some(">=2.0".to_string()),
        })
    );
    assert_eq!(
        parse_requires_dist("win-inet-pton ; sys_platform == \"win32\" and extra == 'socks'"),
        None
    );
}

#[test]
fn test_parse_pypi_json() {
    let payload = r#"{
        "info": {
            "name": "foo",
            "version": "2.0",
            "requires_dist": [
                "requests (>=2.25)",
                "idna",
                "pytest (>=3.0) ; extra == 'test'"
            ]
        },
        "urls": [
            {"packagetype": "bdist_wheel", "url": "https://files.example.org/foo-2.0-py3-none-any.whl"},
            {"packagetype": "sdist", "url": "https://files.example.org/foo-2.0.tar.gz"}
        ]
    }"#;
    let json_doc = payload.parse::<Value>().unwrap();
    let package = parse_pypi_json(&json_doc).unwrap();

    assert_eq!(package.name, "foo");
    assert_eq!(package.version, "2.0");
    let run = package.requirements_for("run");
    assert_eq!(run.len(), 2);
    assert_eq!(run[0].name, "requests");
    assert_eq!(run[0].specifier, Some(">=2.25".to_string()));
    assert_eq!(run[1].name, "idna");
    assert_eq!(run[1].specifier, None);
    assert_eq!(
        package.archive_url,
        Some("https://files.example.org/foo-2.0.tar.gz".to_string())
    );
}

#[test]
fn test_pypi_conventions() {
    let frontend = PyPiFrontend::new();
    assert_eq!(frontend.portfile_path("Flask"), "python/py-flask/Portfile");

    let requirement = Requirement {
        name: "Jinja2".to_string(),
        specifier: None,
    };
    assert_eq!(
        frontend.format_requirement(&requirement),
        "port:py${python.version}-jinja2"
    );

    assert_eq!(
        frontend.extract_version("version             1.0.4"),
        Some("1.0.4".to_string())
    );
    assert_eq!(frontend.extract_version("python.versions     39"), None);
    assert_eq!(
        frontend.rewrite_version_line("version             1.0.4", "2.0.1"),
        Some("version             2.0.1".to_string())
    );
}

#[test]
fn test_find_version() {
    let frontend = PyPiFrontend::new();
    let portfile = "PortSystem          1.0\nname                py-foo\nversion             1.0\n";
    assert_eq!(frontend.find_version(portfile), Some("1.0".to_string()));
    assert_eq!(frontend.find_version("name                py-foo\n"), None);
}

pub struct RubyGemsFrontend {
    version_re: Regex,
}

impl RubyGemsFrontend {
    pub fn new() -> RubyGemsFrontend {
        RubyGemsFrontend {
            version_re: Regex::new(r"^(ruby\.setup\s+\S+\s+)(\S+)(.*)$").unwrap(),
        }
    }
}

impl Frontend for RubyGemsFrontend {
    fn portfile_path(&self, package: &str) -> String {
        format!("ruby/rb-{}/Portfile", package.to_lowercase())
    }

    fn format_requirement(&self, requirement: &Requirement) -> String {
        format!(
            "port:rb${{ruby.suffix}}-{}",
            requirement.name.to_lowercase()
        )
    }

    fn extract_version(&self, line: &str) -> Option<String> {
        self.version_re
            .captures(line)
            .map(|caps| caps[2].to_string())
    }

    fn rewrite_version_line(&self, line: &str, version: &str) -> Option<String> {
        self.version_re
            .captures(line)
            .map(|caps| format!("{}{}{}", &caps[1], version, &caps[3]))
    }

    fn parse(&self, package: &str, version: Option<&str>) -> Result<Package, Error> {
        let uri = match version {
            Some(version) => format!(
                "https://rubygems.org/api/v2/rubygems/{}/versions/{}.json",
                package, version
            ),
            None => format!("https://rubygems.org/api/v1/gems/{}.json", package),
        };
        let json_doc = fetch_json(&uri)?;
        parse_rubygems_json(package, &json_doc)
    }
}

fn parse_rubygems_json(package: &str, json_doc: &Value) -> Result<Package, Error> {
    let name = json_doc["name"].as_str().unwrap_or(package).to_string();
    // The v1 gems endpoint calls this field "version", the v2 versions
    // endpoint "number".
    let version = match json_doc["version"]
        .as_str()
        .or_else(|| json_doc["number"].as_str())
    {
        Some(version) => version.to_string(),
        None => {
            return Err(Error::Frontend(format!(
                "no version in RubyGems metadata for {}",
                name
            )))
        }
    };

    let mut run = Vec::new();
    if let Some(runtime) = json_doc["dependencies"]["runtime"].as_array() {
        for dependency in runtime {
            if let Some(dep_name) = dependency["name"].as_str() {
                run.push(Requirement {
                    name: dep_name.to_string(),
                    specifier: dependency["requirements"]
                        .as_str()
                        .map(|requirements| requirements.to_string()),
                });
            }
        }
    }
    let mut requirements = HashMap::new();
    requirements.insert("run".to_string(), run);

    let archive_url = match json_doc["gem_uri"].as_str() {
        Some(uri) => Some(uri.to_string()),
        None => Some(format!(
            "https://rubygems.org/gems/{}-{}.gem",
            name, version
        )),
    };

    Ok(Package {
        name,
        version,
        requirements,
        archive_url,
    })
}

#[test]
fn test_parse_rubygems_json() {
    let payload = r#"{
        "name": "faker",
        "version": "3.2.1",
        "dependencies": {
            "development": [{"name": "rake", "requirements": ">= 13.0"}],
            "runtime": [{"name": "i18n", "requirements": ">= 1.8.11, < 2"}]
        },
        "gem_uri": "https://rubygems.org/gems/faker-3.2.1.gem"
    }"#;
    let json_doc = payload.parse::<Value>().unwrap();
    let package = parse_rubygems_json("faker", &json_doc).unwrap();

    assert_eq!(package.name, "faker");
    assert_eq!(package.version, "3.2.1");
    let run = package.requirements_for("run");
    assert_eq!(run.len(), 1);
    assert_eq!(run[0].name, "i18n");
    assert_eq!(run[0].specifier, Some(">= 1.8.11, < 2".to_string()));
    assert_eq!(
        package.archive_url,
        Some("https://rubygems.org/gems/faker-3.2.1.gem".to_string())
    );
}

#[test]
fn test_parse_rubygems_json_versioned() {
    let payload = r#"{
        "name": "faker",
        "number": "3.0.0",
        "dependencies": {
            "development": [],
            "runtime": [{"name": "i18n", "requirements": ">= 1.6"}]
        }
    }"#;
    let json_doc = payload.parse::<Value>().unwrap();
    let package = parse_rubygems_json("faker", &json_doc).unwrap();

    assert_eq!(package.version, "3.0.0");
    assert_eq!(
        package.archive_url,
        Some("https://rubygems.org/gems/faker-3.0.0.gem".to_string())
    );
}

#[test]
fn test_rubygems_conventions() {
    let frontend = RubyGemsFrontend::new();
    assert_eq!(frontend.portfile_path("Faker"), "ruby/rb-faker/Portfile");

    let requirement = Requirement {
        name: "i18n".to_string(),
        specifier: None,
    };
    assert_eq!(
        frontend.format_requirement(&requirement),
        "port:rb${ruby.suffix}-i18n"
    );

    assert_eq!(
        frontend.extract_version("ruby.setup          faker 3.2.1 gem {}"),
        Some("3.2.1".to_string())
    );
    assert_eq!(
        frontend.rewrite_version_line("ruby.setup          faker 3.2.1 gem {}", "3.2.2"),
        Some("ruby.setup          faker 3.2.2 gem {}".to_string())
    );
}

fn user_agent() -> String {
    const NAME: &str = env!("CARGO_PKG_NAME");
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const REPO: &str = env!("CARGO_PKG_REPOSITORY");
    format!("{} {} ( {} )", NAME, VERSION, REPO)
}

fn http_get(uri: &str) -> Result<Response, Error> {
    let client = Client::builder().gzip(true).build()?;
    let response = client.get(uri).header(USER_AGENT, user_agent()).send()?;
    if !response.status().is_success() {
        return Err(Error::Frontend(format!(
            "{} returned {}",
            uri,
            response.status()
        )));
    }
    Ok(response)
}

fn fetch_json(uri: &str) -> Result<Value, Error> {
    let http_body = http_get(uri)?.text()?;
    match http_body.parse::<Value>() {
        Ok(json_doc) => Ok(json_doc),
        Err(e) => Err(Error::Frontend(format!(
            "unparseable response from {}: {}",
            uri, e
        ))),
    }
}

fn fetch_archive(uri: &str) -> Result<Archive, Error> {
    let bytes = http_get(uri)?.bytes()?;
    Ok(Archive {
        rmd160: format!("{:x}", Ripemd160::digest(&bytes)),
        sha256: format!("{:x}", Sha256::digest(&bytes)),
        size: bytes.len() as u64,
    })
}

#[cfg(test)]
pub fn test_package(name: &str, version: &str, run: &[&str]) -> Package {
    let run: Vec<Requirement> = run
        .iter()
        .map(|name| Requirement {
            name: name.to_string(),
            specifier: None,
        })
        .collect();
    let mut requirements = HashMap::new();
    requirements.insert("run".to_string(), run);
    Package {
        name: name.to_string(),
        version: version.to_string(),
        requirements,
        archive_url: None,
    }
}

#[cfg(test)]
pub fn test_archive() -> Archive {
    Archive {
        rmd160: "ffeeddccbbaa99887766554433221100ffeeddcc".to_string(),
        sha256: "ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100".to_string(),
        size: 2048,
    }
}
