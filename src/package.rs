//! `sn.yaml` dependency manifest and `.pc` pkg-config resolution
//! (spec.md §4.4/§6).
//!
//! The source's `package_yaml.c` hand-rolls a libyaml event-stream walker
//! over a fixed-size `PackageConfig`; here the same shape is just a
//! `#[derive(Deserialize)]` struct handed to `serde_yaml`; and `package.h`'s
//! `PKG_MAX_DEPS`-capped array becomes a `Vec`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PackageDependency {
    pub name: String,
    #[serde(default)]
    pub git: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
}

#[derive(Debug)]
pub enum PackageCfgError {
    Read(String),
    Parse(String),
}

impl fmt::Display for PackageCfgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageCfgError::Read(e) => write!(f, "cannot read sn.yaml: {e}"),
            PackageCfgError::Parse(e) => write!(f, "cannot parse sn.yaml: {e}"),
        }
    }
}

impl std::error::Error for PackageCfgError {}

pub fn package_yaml_exists(project_dir: &Path) -> bool {
    project_dir.join("sn.yaml").is_file()
}

pub fn package_yaml_parse(project_dir: &Path) -> Result<PackageConfig, PackageCfgError> {
    let text = fs::read_to_string(project_dir.join("sn.yaml"))
        .map_err(|e| PackageCfgError::Read(e.to_string()))?;
    serde_yaml::from_str(&text).map_err(|e| PackageCfgError::Parse(e.to_string()))
}

/// `windows|darwin|linux`, matching `get_platform_name()` in
/// `gcc_backend_pkgconfig.c`.
pub fn platform_name() -> &'static str {
    if cfg!(windows) {
        "windows"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else {
        "linux"
    }
}

/// Per-dependency `.sn/<pkg>/libs/<platform>/{include,lib,lib/pkgconfig}`
/// paths (spec.md §6's persisted state layout).
pub struct PackagePaths {
    pub include_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub pkgconfig_dir: PathBuf,
}

pub fn dependency_paths(project_dir: &Path, dep_name: &str) -> PackagePaths {
    let base = project_dir.join(".sn").join(dep_name).join("libs").join(platform_name());
    PackagePaths {
        include_dir: base.join("include"),
        lib_dir: base.join("lib"),
        pkgconfig_dir: base.join("lib").join("pkgconfig"),
    }
}

/// Resolved `-I`/`-D`/`-L` flag contributions for every dependency declared
/// in `sn.yaml`, or `None` if the file is absent or has no dependencies
/// (the driver falls back to SDK-only paths in that case).
pub struct ResolvedPackages {
    pub include_flags: Vec<String>,
    pub lib_flags: Vec<String>,
}

pub fn resolve_package_libs(project_dir: &Path) -> Option<ResolvedPackages> {
    if !package_yaml_exists(project_dir) {
        return None;
    }
    let config = package_yaml_parse(project_dir).ok()?;
    if config.dependencies.is_empty() {
        return None;
    }

    let mut include_flags = Vec::new();
    let mut lib_flags = Vec::new();

    for dep in &config.dependencies {
        let paths = dependency_paths(project_dir, &dep.name);

        if paths.include_dir.is_dir() {
            include_flags.push(format!("-I{}", quote_path(&paths.include_dir)));
        }
        if paths.pkgconfig_dir.is_dir() {
            include_flags.extend(parse_pkgconfig_dir(&paths.pkgconfig_dir));
        }
        if paths.lib_dir.is_dir() {
            let lib_str = quote_path(&paths.lib_dir);
            lib_flags.push(format!("-L{lib_str} -Wl,-rpath,{lib_str}"));
        }
    }

    Some(ResolvedPackages { include_flags, lib_flags })
}

fn quote_path(p: &Path) -> String {
    format!("\"{}\"", p.display())
}

// ---- .pc file parsing -------------------------------------------------

struct PcVars {
    entries: Vec<(String, String)>,
}

impl PcVars {
    fn new(pcfiledir: &str) -> Self {
        PcVars { entries: vec![("pcfiledir".to_string(), pcfiledir.to_string())] }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    fn set(&mut self, name: &str, value: String) {
        self.entries.push((name.to_string(), value));
    }

    /// Expands every `${name}` occurrence in `input`, leaving unknown
    /// variables verbatim (matches `pc_substitute_vars`'s lookup-or-copy
    /// behaviour in `gcc_backend_pkgconfig.c`).
    fn substitute(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let bytes = input.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
                if let Some(end) = input[i + 2..].find('}') {
                    let name = &input[i + 2..i + 2 + end];
                    if let Some(value) = self.get(name) {
                        out.push_str(value);
                    } else {
                        out.push_str(&input[i..i + 2 + end + 1]);
                    }
                    i += 2 + end + 1;
                    continue;
                }
            }
            let ch = input[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }
}

/// Tokenizes a `Cflags:` line, honouring double-quoted tokens, matching
/// `parse_pc_file`'s hand-rolled tokenizer.
fn tokenize_cflags(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut tok = String::new();
        if c == '"' {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                tok.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                tok.push(c);
                chars.next();
            }
        }
        tokens.push(tok);
    }
    tokens
}

/// Parses one `.pc` file, returning the `-I`/`-D` flags its `Cflags:` line
/// contributes once `${var}` substitution is applied. `-I` paths that don't
/// exist on disk are dropped, mirroring `dir_exists` in the source.
fn parse_pc_file(path: &Path) -> Vec<String> {
    let Ok(text) = fs::read_to_string(path) else { return Vec::new() };
    let base_dir = path.parent().map(|p| p.display().to_string()).unwrap_or_default();
    let mut vars = PcVars::new(&base_dir);
    let mut flags = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("Cflags:") {
            let expanded = vars.substitute(rest.trim_start());
            for token in tokenize_cflags(&expanded) {
                if let Some(path_part) = token.strip_prefix("-I") {
                    let normalized = Path::new(path_part);
                    if normalized.is_dir() {
                        flags.push(format!("-I\"{}\"", normalized.display()));
                    }
                } else if token.starts_with("-D") {
                    flags.push(token);
                }
            }
            continue;
        }
        if let Some(eq) = line.find('=') {
            if !line[..eq].contains(':') {
                let (name, value) = line.split_at(eq);
                let expanded = vars.substitute(&value[1..]);
                vars.set(name.trim(), expanded);
            }
        }
    }

    flags
}

fn parse_pkgconfig_dir(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else { return Vec::new() };
    let mut flags = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("pc") {
            flags.extend(parse_pc_file(&path));
        }
    }
    flags.sort();
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn package_yaml_exists_checks_file_presence() {
        let dir = tempdir().unwrap();
        assert!(!package_yaml_exists(dir.path()));
        fs::write(dir.path().join("sn.yaml"), "name: demo\n").unwrap();
        assert!(package_yaml_exists(dir.path()));
    }

    #[test]
    fn package_yaml_parse_reads_dependencies() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("sn.yaml"),
            "name: demo\nversion: 1.0.0\ndependencies:\n  - name: utils\n    git: https://example.com/sn-utils.git\n    tag: v1.2.0\n",
        )
        .unwrap();
        let cfg = package_yaml_parse(dir.path()).unwrap();
        assert_eq!(cfg.dependencies.len(), 1);
        assert_eq!(cfg.dependencies[0].name, "utils");
        assert_eq!(cfg.dependencies[0].tag.as_deref(), Some("v1.2.0"));
    }

    #[test]
    fn resolve_package_libs_none_without_manifest() {
        let dir = tempdir().unwrap();
        assert!(resolve_package_libs(dir.path()).is_none());
    }

    #[test]
    fn resolve_package_libs_finds_include_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("sn.yaml"), "name: demo\ndependencies:\n  - name: zlib\n").unwrap();
        let paths = dependency_paths(dir.path(), "zlib");
        fs::create_dir_all(&paths.include_dir).unwrap();
        let resolved = resolve_package_libs(dir.path()).unwrap();
        assert_eq!(resolved.include_flags.len(), 1);
        assert!(resolved.include_flags[0].contains("zlib"));
    }

    #[test]
    fn pc_var_substitution_expands_pcfiledir() {
        let vars = PcVars::new("/opt/zlib/lib/pkgconfig");
        let out = vars.substitute("-I${pcfiledir}/../../include");
        assert_eq!(out, "-I/opt/zlib/lib/pkgconfig/../../include");
    }

    #[test]
    fn pc_var_substitution_leaves_unknown_vars_verbatim() {
        let vars = PcVars::new("/x");
        let out = vars.substitute("${nope}");
        assert_eq!(out, "${nope}");
    }

    #[test]
    fn tokenize_cflags_splits_on_whitespace_and_quotes() {
        let tokens = tokenize_cflags(r#"-I/a/b "FOO=1 2" -DBAR"#);
        assert_eq!(tokens, vec!["-I/a/b", "FOO=1 2", "-DBAR"]);
    }

    #[test]
    fn parse_pc_file_extracts_cflags_and_substitutes_vars() {
        let dir = tempdir().unwrap();
        let inc_dir = dir.path().join("include");
        fs::create_dir_all(&inc_dir).unwrap();
        let pc_path = dir.path().join("zlib.pc");
        fs::write(
            &pc_path,
            format!(
                "prefix={}\nName: zlib\nVersion: 1.3\nCflags: -I${{prefix}} -DZLIB_CONST\n",
                dir.path().display()
            ),
        )
        .unwrap();
        let flags = parse_pc_file(&pc_path);
        assert!(flags.iter().any(|f| f.contains("include") && f.starts_with("-I")));
        assert!(flags.iter().any(|f| f == "-DZLIB_CONST"));
    }
}
