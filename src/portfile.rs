use regex::Regex;

use diff::PackageDiff;
use frontend::{Archive, Frontend};

const DEPENDS_KEYWORD: &str = "depends_lib-append";

/// Strips the line-continuation decoration from a raw dependency-block
/// line, leaving just the dependency token.
pub fn clean_depends_line(line: &str) -> String {
    let line = line.trim_end_matches('\n').trim_end();
    let line = if line.ends_with('\\') {
        &line[..line.len() - 1]
    } else {
        line
    };
    line.trim().to_string()
}

/// Renders dependency tokens as a backslash-continued depends_lib-append
/// block. Continuation lines are aligned under the first token; an empty
/// token list renders no lines at all.
pub fn format_depends(deps: &[String], indent: &str) -> Vec<String> {
    let continuation = " ".repeat(indent.len() + DEPENDS_KEYWORD.len() + 2);
    let mut lines = Vec::with_capacity(deps.len());
    for (i, dep) in deps.iter().enumerate() {
        let mut line = if i == 0 {
            format!("{}{}  {}", indent, DEPENDS_KEYWORD, dep)
        } else {
            format!("{}{}", continuation, dep)
        };
        if i + 1 < deps.len() {
            line.push_str(" \\");
        }
        lines.push(line);
    }
    lines
}

/// Applies the requirement delta to the dependency tokens found in the
/// Portfile: deleted requirements are removed by rendered name, new ones
/// appended. Surviving tokens keep their relative order and no token is
/// introduced twice.
pub fn upgrade_depends(
    old_deps: &[String],
    diff: &PackageDiff,
    frontend: &dyn Frontend,
) -> Vec<String> {
    let mut deps = old_deps.to_vec();
    for requirement in diff.deleted_requirements() {
        let token = frontend.format_requirement(requirement);
        if let Some(pos) = deps.iter().position(|dep| *dep == token) {
            deps.remove(pos);
        }
    }
    for requirement in diff.new_requirements() {
        let token = frontend.format_requirement(requirement);
        if !deps.contains(&token) {
            deps.push(token);
        }
    }
    deps
}

/// Rewrites a Portfile for the new release in a single pass over its
/// lines: version, revision, checksum and size fields are substituted in
/// place, the dependency block is collected, patched with the delta and
/// spliced back at its original position. Everything else passes through
/// verbatim.
///
/// Returns the rewritten text and whether a dependency block was found.
pub fn update_portfile(
    portfile: &str,
    frontend: &dyn Frontend,
    diff: &PackageDiff,
    archive: &Archive,
) -> (String, bool) {
    // Block entry recognizes 0 or 1 levels of 4-space indent; deeper
    // nesting is out of scope.
    let depends_re = Regex::new(r"^(    )?depends_lib-append\s+(.*)$").unwrap();
    let revision_re = Regex::new(r"^(revision\s+).*$").unwrap();
    let rmd160_re = Regex::new(r"^(.*)(rmd160\s+)[0-9a-f]{40}(.*)$").unwrap();
    let sha256_re = Regex::new(r"^(.*)(sha256\s+)[0-9a-f]{64}(.*)$").unwrap();
    let size_re = Regex::new(r"^(.*)(size\s+)[0-9]+(.*)$").unwrap();

    let mut out: Vec<String> = Vec::new();
    let mut old_deps: Vec<String> = Vec::new();
    let mut indent = String::new();
    let mut splice_at = None;
    let mut in_block = false;

    for line in portfile.lines() {
        if in_block {
            let token = clean_depends_line(line);
            if !token.is_empty() {
                old_deps.push(token);
            }
            in_block = line.trim_end().ends_with('\\');
            continue;
        }

        if let Some(caps) = depends_re.captures(line) {
            if splice_at.is_none() {
                indent = caps.get(1).map_or("", |m| m.as_str()).to_string();
                splice_at = Some(out.len());
            }
            let token = clean_depends_line(&caps[2]);
            if !token.is_empty() {
                old_deps.push(token);
            }
            in_block = line.trim_end().ends_with('\\');
            continue;
        }

        let line = match frontend.rewrite_version_line(line, diff.new_version()) {
            Some(rewritten) => rewritten,
            None => line.to_string(),
        };
        // Every upgrade resets the revision.
        let line = match revision_re.captures(&line) {
            Some(caps) => format!("{}0", &caps[1]),
            None => line,
        };
        let line = match rmd160_re.captures(&line) {
            Some(caps) => format!("{}{}{}{}", &caps[1], &caps[2], archive.rmd160, &caps[3]),
            None => line,
        };
        let line = match sha256_re.captures(&line) {
            Some(caps) => format!("{}{}{}{}", &caps[1], &caps[2], archive.sha256, &caps[3]),
            None => line,
        };
        let line = match size_re.captures(&line) {
            Some(caps) => format!("{}{}{}{}", &caps[1], &caps[2], archive.size, &caps[3]),
            None => line,
        };
        out.push(line);
    }

    let found_block = splice_at.is_some();
    if let Some(at) = splice_at {
        let deps = upgrade_depends(&old_deps, diff, frontend);
        out.splice(at..at, format_depends(&deps, &indent));
    }

    let mut text = out.join("\n");
    if portfile.ends_with('\n') {
        text.push('\n');
    }
    (text, found_block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontend::{test_archive, test_package, PyPiFrontend};

    fn deps(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_clean_depends_line() {
        assert_eq!(clean_depends_line("port:py-bar \\\n"), "port:py-bar");
        assert_eq!(clean_depends_line("    port:py-bar \\"), "port:py-bar");
        assert_eq!(clean_depends_line("port:py-bar"), "port:py-bar");
        assert_eq!(clean_depends_line(" \\"), "");
    }

    #[test]
    fn test_format_depends_empty() {
        assert_eq!(format_depends(&[], "    "), Vec::<String>::new());
    }

    #[test]
    fn test_format_depends_single() {
        assert_eq!(
            format_depends(&deps(&["a"]), "    "),
            vec!["    depends_lib-append  a"]
        );
    }

    #[test]
    fn test_format_depends_continuation() {
        assert_eq!(
            format_depends(&deps(&["a", "b"]), "    "),
            vec![
                "    depends_lib-append  a \\",
                "                        b",
            ]
        );
    }

    #[test]
    fn test_format_depends_no_indent() {
        assert_eq!(
            format_depends(&deps(&["a", "b", "c"]), ""),
            vec![
                "depends_lib-append  a \\",
                "                    b \\",
                "                    c",
            ]
        );
    }

    #[test]
    fn test_upgrade_depends() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0", &["bar"]);
        let new = test_package("foo", "2.0", &["baz"]);
        let diff = PackageDiff::new(&old, &new);

        let upgraded = upgrade_depends(
            &deps(&["port:py${python.version}-bar"]),
            &diff,
            &frontend,
        );
        assert_eq!(upgraded, deps(&["port:py${python.version}-baz"]));
    }

    #[test]
    fn test_upgrade_depends_keeps_order_and_unknowns() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0", &["bar"]);
        let new = test_package("foo", "2.0", &["baz"]);
        let diff = PackageDiff::new(&old, &new);

        // A hand-added token the index never heard of stays put.
        let upgraded = upgrade_depends(
            &deps(&[
                "port:py${python.version}-qux",
                "port:py${python.version}-bar",
            ]),
            &diff,
            &frontend,
        );
        assert_eq!(
            upgraded,
            deps(&[
                "port:py${python.version}-qux",
                "port:py${python.version}-baz",
            ])
        );
    }

    #[test]
    fn test_upgrade_depends_no_duplicates() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0", &[]);
        let new = test_package("foo", "2.0", &["baz"]);
        let diff = PackageDiff::new(&old, &new);

        let upgraded = upgrade_depends(
            &deps(&["port:py${python.version}-baz"]),
            &diff,
            &frontend,
        );
        assert_eq!(upgraded, deps(&["port:py${python.version}-baz"]));
    }

    const PORTFILE: &str = "\
PortSystem          1.0
PortGroup           python 1.0

name                py-foo
version             1.0.4
revision            2
license             MIT

checksums           rmd160  0123456789abcdef0123456789abcdef01234567 \\
                    sha256  0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef \\
                    size    1024

if {${name} ne ${subport}} {
    depends_lib-append  port:py${python.version}-bar \\
                        port:py${python.version}-qux
}
";

    #[test]
    fn test_update_portfile_field_substitutions() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0.4", &["bar", "qux"]);
        let new = test_package("foo", "2.0.1", &["bar", "qux"]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let (text, found_block) = update_portfile(PORTFILE, &frontend, &diff, &archive);
        assert!(found_block);
        assert_eq!(
            text,
            "\
PortSystem          1.0
PortGroup           python 1.0

name                py-foo
version             2.0.1
revision            0
license             MIT

checksums           rmd160  ffeeddccbbaa99887766554433221100ffeeddcc \\
                    sha256  ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100 \\
                    size    2048

if {${name} ne ${subport}} {
    depends_lib-append  port:py${python.version}-bar \\
                        port:py${python.version}-qux
}
"
        );
    }

    #[test]
    fn test_update_portfile_dependency_delta() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0.4", &["bar", "qux"]);
        let new = test_package("foo", "2.0.1", &["qux", "baz"]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let (text, _) = update_portfile(PORTFILE, &frontend, &diff, &archive);
        assert!(text.contains(
            "    depends_lib-append  port:py${python.version}-qux \\\n\
             \x20                       port:py${python.version}-baz\n"
        ));
        assert!(!text.contains("-bar"));
    }

    #[test]
    fn test_update_portfile_idempotent() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0.4", &["bar", "qux"]);
        let new = test_package("foo", "2.0.1", &["qux", "baz"]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let (first, _) = update_portfile(PORTFILE, &frontend, &diff, &archive);
        let (second, _) = update_portfile(&first, &frontend, &diff, &archive);
        assert_eq!(first, second);
    }

    #[test]
    fn test_update_portfile_empty_new_deps() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0.4", &["bar", "qux"]);
        let new = test_package("foo", "2.0.1", &[]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let (text, found_block) = update_portfile(PORTFILE, &frontend, &diff, &archive);
        assert!(found_block);
        // All dependencies dropped: the whole block is omitted, no bare
        // keyword is left behind.
        assert!(!text.contains("depends_lib-append"));
        assert!(text.contains("if {${name} ne ${subport}} {\n}\n"));
    }

    #[test]
    fn test_update_portfile_without_block() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0.4", &[]);
        let new = test_package("foo", "2.0.1", &["baz"]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let portfile = "name                py-foo\nversion             1.0.4\n";
        let (text, found_block) = update_portfile(portfile, &frontend, &diff, &archive);
        assert!(!found_block);
        assert_eq!(text, "name                py-foo\nversion             2.0.1\n");
    }

    #[test]
    fn test_update_portfile_without_checksums() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0", &[]);
        let new = test_package("foo", "2.0", &[]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let portfile = "version             1.0\ndepends_lib-append  port:py${python.version}-six\n";
        let (text, found_block) = update_portfile(portfile, &frontend, &diff, &archive);
        assert!(found_block);
        assert_eq!(
            text,
            "version             2.0\ndepends_lib-append  port:py${python.version}-six\n"
        );
    }

    #[test]
    fn test_update_portfile_unindented_block() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0", &["bar"]);
        let new = test_package("foo", "2.0", &["bar", "baz"]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let portfile = "\
version             1.0
depends_lib-append  port:py${python.version}-bar
homepage            https://example.org
";
        let (text, _) = update_portfile(portfile, &frontend, &diff, &archive);
        assert_eq!(
            text,
            "\
version             2.0
depends_lib-append  port:py${python.version}-bar \\
                    port:py${python.version}-baz
homepage            https://example.org
"
        );
    }

    #[test]
    fn test_update_portfile_sha256_line_only_digest_changes() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0", &[]);
        let new = test_package("foo", "2.0", &[]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let portfile = "checksums           sha256  \
0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef \\\n";
        let (text, _) = update_portfile(portfile, &frontend, &diff, &archive);
        assert_eq!(
            text,
            "checksums           sha256  \
ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100 \\\n"
        );
    }

    #[test]
    fn test_update_portfile_no_trailing_newline() {
        let frontend = PyPiFrontend::new();
        let old = test_package("foo", "1.0", &[]);
        let new = test_package("foo", "2.0", &[]);
        let diff = PackageDiff::new(&old, &new);
        let archive = test_archive();

        let (text, _) = update_portfile("version             1.0", &frontend, &diff, &archive);
        assert_eq!(text, "version             2.0");
    }
}
