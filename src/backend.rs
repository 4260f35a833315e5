//! C-toolchain backend driver (spec.md §4.4).
//!
//! Chooses a `BackendType` from the configured compiler command (or, failing
//! that, the running binary's own name), layers `sn.cfg`/environment/default
//! flag sets on top of it, assembles the full include/library search path,
//! and shells out via `std::process::Command` — the teacher's own
//! subprocess-invocation idiom in `project/build.rs`, generalised from a
//! `cargo build` invocation to an arbitrary C compiler line.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{CompileError, LinkError, PragmaError, ToolchainError};
use crate::package;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Gcc,
    Clang,
    TinyCc,
    Msvc,
}

impl BackendType {
    /// `tcc`/`tinycc` → TinyCC; `clang` → Clang; `cl`/`msvc` → MSVC; else GCC
    /// (spec.md §4.4's "Toolchain detection"). Clang is checked before `cl`
    /// so `clang-cl` still resolves to Clang.
    pub fn detect_from_command(cc: &str) -> BackendType {
        let lower = cc.to_ascii_lowercase();
        if lower.contains("tcc") || lower.contains("tinycc") {
            BackendType::TinyCc
        } else if lower.contains("clang") {
            BackendType::Clang
        } else if lower.contains("cl") || lower.contains("msvc") {
            BackendType::Msvc
        } else {
            BackendType::Gcc
        }
    }

    /// Falls back to the running binary's own basename (`sn-tcc`,
    /// `sn-clang`, `sn-msvc`) when no compiler command was configured at
    /// all, defaulting to Clang on Windows and GCC elsewhere.
    pub fn detect_from_exe() -> BackendType {
        let exe_name = env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .unwrap_or_default();
        let lower = exe_name.to_ascii_lowercase();
        if lower.contains("tcc") || lower.contains("tinycc") {
            BackendType::TinyCc
        } else if lower.contains("clang") {
            BackendType::Clang
        } else if lower.contains("msvc") {
            BackendType::Msvc
        } else if cfg!(windows) {
            BackendType::Clang
        } else {
            BackendType::Gcc
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendType::Gcc => "gcc",
            BackendType::Clang => "clang",
            BackendType::TinyCc => "tinycc",
            BackendType::Msvc => "msvc",
        }
    }

    /// `lib/gcc`, `lib/clang`, `lib/tinycc`, `lib/msvc`; on Unix, Clang and
    /// GCC share `lib/gcc` (spec.md §4.4's "Per-backend defaults").
    pub fn lib_subdir(self) -> &'static str {
        match self {
            BackendType::Gcc => "lib/gcc",
            BackendType::Clang => {
                if cfg!(windows) {
                    "lib/clang"
                } else {
                    "lib/gcc"
                }
            }
            BackendType::TinyCc => "lib/tinycc",
            BackendType::Msvc => "lib/msvc",
        }
    }
}

const DEFAULT_STD: &str = "c99";

fn default_debug_cflags(backend: BackendType) -> &'static str {
    match backend {
        BackendType::Msvc => "/Zi /Od",
        BackendType::TinyCc => "-g",
        BackendType::Gcc | BackendType::Clang => {
            if cfg!(target_os = "macos") {
                "-fno-omit-frame-pointer -g"
            } else {
                "-no-pie -fsanitize=address -fno-omit-frame-pointer -g"
            }
        }
    }
}

fn default_release_cflags(backend: BackendType) -> &'static str {
    match backend {
        BackendType::Msvc => "/O2 /DNDEBUG",
        BackendType::TinyCc => "-O2",
        BackendType::Gcc | BackendType::Clang => "-O3 -flto",
    }
}

fn default_cflags(backend: BackendType) -> &'static str {
    match backend {
        BackendType::Msvc => "/W3 /D_CRT_SECURE_NO_WARNINGS",
        _ => "",
    }
}

fn default_ldlibs(backend: BackendType) -> &'static str {
    match backend {
        BackendType::Msvc => "ws2_32.lib bcrypt.lib",
        BackendType::Gcc | BackendType::Clang if cfg!(windows) => "-lws2_32 -lbcrypt -lpthread",
        _ => "",
    }
}

fn default_cc(backend: BackendType) -> &'static str {
    match backend {
        BackendType::Gcc => "gcc",
        BackendType::Clang => "clang",
        BackendType::TinyCc => "tcc",
        BackendType::Msvc => "cl",
    }
}

/// Layered `SN_CC`/`SN_STD`/… configuration, loaded env-var > `sn.cfg` >
/// backend default (spec.md §4.4's "Toolchain detection").
#[derive(Debug, Clone)]
pub struct CcBackendConfig {
    pub cc: String,
    pub std: String,
    pub debug_cflags: String,
    pub release_cflags: String,
    pub cflags: String,
    pub ldflags: String,
    pub ldlibs: String,
}

/// `KEY=VALUE` lines from `sn.cfg`, `#`-comments and blank lines ignored
/// (spec.md §6's "Persisted state layout").
#[derive(Debug, Default)]
struct CfgFile {
    cc: Option<String>,
    std: Option<String>,
    debug_cflags: Option<String>,
    release_cflags: Option<String>,
    cflags: Option<String>,
    ldflags: Option<String>,
    ldlibs: Option<String>,
}

fn parse_config_line(cfg: &mut CfgFile, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }
    let Some(eq) = line.find('=') else { return };
    let key = line[..eq].trim();
    let value = line[eq + 1..].trim().to_string();
    match key {
        "SN_CC" => cfg.cc = Some(value),
        "SN_STD" => cfg.std = Some(value),
        "SN_DEBUG_CFLAGS" => cfg.debug_cflags = Some(value),
        "SN_RELEASE_CFLAGS" => cfg.release_cflags = Some(value),
        "SN_CFLAGS" => cfg.cflags = Some(value),
        "SN_LDFLAGS" => cfg.ldflags = Some(value),
        "SN_LDLIBS" => cfg.ldlibs = Some(value),
        _ => {}
    }
}

fn load_config_file(path: &Path) -> CfgFile {
    let mut cfg = CfgFile::default();
    if let Ok(text) = fs::read_to_string(path) {
        for line in text.lines() {
            parse_config_line(&mut cfg, line);
        }
    }
    cfg
}

/// `SN_SDK` env var → `compiler_dir`'s own `sn.cfg` → `compiler_dir/../lib/sindarin`
/// → `compiler_dir` itself (spec.md §4.3's SDK root search order, applied
/// here to locate the backend's own `sn.cfg`).
pub fn sdk_root(compiler_dir: &Path) -> PathBuf {
    if let Ok(env_root) = env::var("SN_SDK") {
        return PathBuf::from(env_root);
    }
    if compiler_dir.join("sn.cfg").is_file() {
        return compiler_dir.to_path_buf();
    }
    let sibling = compiler_dir.join("../lib/sindarin");
    if sibling.join("sn.cfg").is_file() {
        return sibling;
    }
    compiler_dir.to_path_buf()
}

/// Builds the final, fully-layered config for `compiler_dir`'s SDK
/// (spec.md §4.4's config-priority table: env var > `sn.cfg` > default).
pub fn init_config(compiler_dir: &Path) -> CcBackendConfig {
    let root = sdk_root(compiler_dir);
    let file_cfg = load_config_file(&root.join("sn.cfg"));

    let configured_cc = env::var("SN_CC").ok().filter(|v| !v.is_empty()).or(file_cfg.cc.clone());
    let backend = match &configured_cc {
        Some(cc) => BackendType::detect_from_command(cc),
        None => BackendType::detect_from_exe(),
    };

    let cc = configured_cc.unwrap_or_else(|| default_cc(backend).to_string());

    let pick = |env_name: &str, file_val: &Option<String>, default: &str| -> String {
        env::var(env_name)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| file_val.clone().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| default.to_string())
    };

    CcBackendConfig {
        cc,
        std: pick("SN_STD", &file_cfg.std, DEFAULT_STD),
        debug_cflags: pick("SN_DEBUG_CFLAGS", &file_cfg.debug_cflags, default_debug_cflags(backend)),
        release_cflags: pick("SN_RELEASE_CFLAGS", &file_cfg.release_cflags, default_release_cflags(backend)),
        cflags: pick("SN_CFLAGS", &file_cfg.cflags, default_cflags(backend)),
        ldflags: pick("SN_LDFLAGS", &file_cfg.ldflags, ""),
        ldlibs: pick("SN_LDLIBS", &file_cfg.ldlibs, default_ldlibs(backend)),
    }
}

/// Strips `-flto`, `-fsanitize=*`, and `-fno-omit-frame-pointer` from a flag
/// string, whitespace-normalised with order preserved — TinyCC rejects all
/// three (spec.md §4.4's "Flag filtering"; spec.md §8's "Flag filter"
/// testable property).
pub fn filter_tinycc_flags(flags: &str) -> String {
    flags
        .split_whitespace()
        .filter(|tok| *tok != "-flto" && *tok != "-fno-omit-frame-pointer" && !tok.starts_with("-fsanitize"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-platform library-name translation applied to each `#pragma link`
/// target before `-l` is prepended (spec.md §4.4's "Library translation").
pub fn translate_lib_name(lib: &str) -> &str {
    if cfg!(windows) && lib == "z" {
        "zlib"
    } else {
        lib
    }
}

/// Appends transitive dependencies triggered by statically-linked libraries:
/// OpenSSL, libssh2, and libgit2 each pull in a platform-specific extra set
/// (spec.md §4.4's "Library translation").
fn transitive_deps(libs: &[String]) -> Vec<&'static str> {
    let mut extra = Vec::new();
    let has = |name: &str| libs.iter().any(|l| l == name);

    if has("ssl") || has("crypto") || has("ngtcp2") || has("ngtcp2_crypto_ossl") {
        if cfg!(windows) {
            extra.push("-lcrypt32");
        } else if cfg!(target_os = "macos") {
            extra.push("-framework Security -framework CoreFoundation");
        } else {
            extra.push("-ldl");
        }
    }
    if has("ssh") {
        if cfg!(windows) {
            extra.push("-lzlib -lbcrypt -lws2_32 -liphlpapi");
        } else {
            extra.push("-lz -lpthread");
        }
    }
    if has("git2") {
        if cfg!(windows) {
            extra.push(
                "-lhttp_parser -lssh2 -lpcre2-8 -lzlib -lssl -lcrypto -lws2_32 -lsecur32 -lbcrypt -lcrypt32 -lrpcrt4 -lole32",
            );
        } else if cfg!(target_os = "macos") {
            extra.push("-lhttp_parser -lssh2 -lpcre2-8 -lz -lssl -lcrypto -liconv -framework Security -framework CoreFoundation");
        } else {
            extra.push("-lhttp_parser -lssh2 -lpcre2-8 -lz -lssl -lcrypto -lpthread -ldl");
        }
    }
    extra
}

/// One `#pragma source` file, plus the directory it was written in so its
/// (possibly relative) path can be resolved (spec.md §4.2's `source_dir`),
/// and the originating file/line for diagnostics.
pub struct PragmaSourceFile {
    pub value: String,
    pub source_dir: String,
    pub filename: String,
    pub line: u32,
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

fn resolve_pragma_path(value: &str, source_dir: &str) -> PathBuf {
    let unquoted = unquote(value);
    let p = Path::new(unquoted);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        Path::new(source_dir).join(unquoted)
    }
}

/// Checks every `#pragma source` target exists before invocation, reporting
/// a path-aware error for each miss (spec.md §4.4's "Validation").
pub fn validate_pragma_sources(sources: &[PragmaSourceFile]) -> Result<(), Vec<PragmaError>> {
    let mut errors = Vec::new();
    for source in sources {
        let full_path = resolve_pragma_path(&source.value, &source.source_dir);
        if !full_path.is_file() {
            errors.push(PragmaError::MissingSourceFile {
                filename: source.filename.clone(),
                line: source.line,
                path: full_path.display().to_string(),
            });
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Probes whether `config.cc` is runnable at all (`cc --version`), the way
/// `gcc_check_available` shells out to a throwaway check command; used by
/// the driver to fail fast with an install hint before constructing the
/// full compile line.
pub fn check_available(config: &CcBackendConfig) -> Result<(), ToolchainError> {
    let ok = Command::new(&config.cc).arg("--version").output().map(|o| o.status.success()).unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(ToolchainError::MissingCompiler { hint: install_hint(&config.cc) })
    }
}

pub fn install_hint(cc: &str) -> String {
    if cc == "gcc" {
        "install GCC: apt install gcc / dnf install gcc / pacman -S gcc".to_string()
    } else if cc == "cl" {
        "run from a Visual Studio Developer Command Prompt, or set SN_CC".to_string()
    } else {
        format!("ensure '{cc}' is installed and on PATH, or set SN_CC")
    }
}

/// Everything `compile()` needs beyond the config itself: the generated C
/// file, where to put the executable, which libraries and extra source
/// files the code generator's pragma pass collected, and display/debug
/// flags forwarded from the CLI.
pub struct CompileRequest<'a> {
    pub config: &'a CcBackendConfig,
    pub c_file: &'a Path,
    pub output_exe: Option<&'a Path>,
    pub compiler_dir: &'a Path,
    pub project_dir: &'a Path,
    pub verbose: bool,
    pub debug_mode: bool,
    pub link_libs: &'a [String],
    pub source_files: &'a [PragmaSourceFile],
}

fn exe_path_for(c_file: &Path, output_exe: Option<&Path>) -> PathBuf {
    match output_exe {
        Some(p) => p.to_path_buf(),
        None => c_file.with_extension(""),
    }
}

/// Assembles the full command line and runs it, mirroring `gcc_compile`'s
/// path composition and per-platform whole-archive/force_load linking
/// convention (spec.md §4.4's "Path composition"/"Command construction").
pub fn compile(req: CompileRequest<'_>) -> Result<PathBuf, CompileError> {
    let config = req.config;
    let backend = BackendType::detect_from_command(&config.cc);
    let root = sdk_root(req.compiler_dir);

    let lib_dir = root.join(backend.lib_subdir());
    let include_dir = root.join("include");
    let deps_include_dir = root.join("deps/include");
    let deps_lib_dir = root.join("deps/lib");
    let has_deps = deps_include_dir.is_dir();

    debug!(backend = backend.name(), lib_dir = %lib_dir.display(), "selected backend");

    let exe_path = exe_path_for(req.c_file, req.output_exe);

    let runtime_lib = if backend == BackendType::Msvc {
        lib_dir.join("sn_runtime.lib")
    } else {
        lib_dir.join("libsn_runtime.a")
    };
    if !runtime_lib.is_file() {
        warn!(path = %runtime_lib.display(), backend = backend.name(), "runtime archive missing");
        return Err(CompileError::Toolchain(ToolchainError::MissingRuntimeArchive {
            path: runtime_lib.display().to_string(),
        }));
    }

    let mut extra_libs = String::new();
    for lib in req.link_libs {
        extra_libs.push_str(&format!(" -l{}", translate_lib_name(lib)));
    }
    for extra in transitive_deps(req.link_libs) {
        extra_libs.push(' ');
        extra_libs.push_str(extra);
    }

    let mut extra_sources = String::new();
    for source in req.source_files {
        let full_path = resolve_pragma_path(&source.value, &source.source_dir);
        extra_sources.push_str(&format!(" \"{}\"", full_path.display()));
    }

    let mode_cflags_owned;
    let mode_cflags: &str = if req.debug_mode { &config.debug_cflags } else { &config.release_cflags };
    let mode_cflags = if backend == BackendType::TinyCc {
        mode_cflags_owned = filter_tinycc_flags(mode_cflags);
        &mode_cflags_owned
    } else {
        mode_cflags
    };

    let deps_include_opt = if has_deps { format!("-I\"{}\"", deps_include_dir.display()) } else { String::new() };
    let deps_lib_opt = if has_deps {
        format!("-L\"{}\" -Wl,-rpath,\"{}\"", deps_lib_dir.display(), deps_lib_dir.display())
    } else {
        String::new()
    };

    let packages = package::resolve_package_libs(req.project_dir);
    let pkg_include_opt = packages.as_ref().map(|p| p.include_flags.join(" ")).unwrap_or_default();
    let pkg_lib_opt = packages.as_ref().map(|p| p.lib_flags.join(" ")).unwrap_or_default();
    if req.verbose && !pkg_include_opt.is_empty() {
        debug!(pkg_include_opt, pkg_lib_opt, "resolved package paths");
    }

    let mut cmd = Command::new(&config.cc);

    if backend == BackendType::Msvc {
        cmd.arg(mode_cflags)
            .arg(&config.cflags)
            .arg(format!("/I\"{}\"", include_dir.display()));
        if has_deps {
            cmd.arg(format!("/I\"{}\"", deps_include_dir.display()));
        }
        cmd.arg(req.c_file);
        for source in req.source_files {
            cmd.arg(resolve_pragma_path(&source.value, &source.source_dir));
        }
        cmd.arg(&runtime_lib)
            .arg(&config.ldlibs)
            .arg(&config.ldflags)
            .arg(format!("/Fe\"{}\"", exe_path.display()))
            .arg("/link")
            .arg(&config.ldlibs);
    } else {
        for flag in mode_cflags.split_whitespace() {
            cmd.arg(flag);
        }
        cmd.arg("-w").arg(format!("-std={}", config.std));
        if cfg!(windows) {
            cmd.arg("-DSN_USE_WIN32_THREADS");
        } else {
            cmd.arg("-D_GNU_SOURCE");
        }
        for flag in config.cflags.split_whitespace() {
            cmd.arg(flag);
        }
        cmd.arg(format!("-I\"{}\"", include_dir.display()));
        if !deps_include_opt.is_empty() {
            cmd.arg(&deps_include_opt);
        }
        for flag in pkg_include_opt.split_whitespace() {
            cmd.arg(flag);
        }
        cmd.arg(req.c_file);
        for source in req.source_files {
            cmd.arg(resolve_pragma_path(&source.value, &source.source_dir));
        }
        if cfg!(target_os = "macos") {
            cmd.arg(format!("-Wl,-force_load,\"{}\"", runtime_lib.display()));
        } else {
            cmd.arg("-Wl,--whole-archive").arg(&runtime_lib).arg("-Wl,--no-whole-archive");
        }
        if !deps_lib_opt.is_empty() {
            for flag in deps_lib_opt.split(' ') {
                cmd.arg(flag);
            }
        }
        for flag in pkg_lib_opt.split_whitespace() {
            cmd.arg(flag);
        }
        for flag in extra_libs.split_whitespace() {
            cmd.arg(flag);
        }
        cmd.arg("-lpthread").arg("-lm");
        for flag in config.ldlibs.split_whitespace() {
            cmd.arg(flag);
        }
        for flag in config.ldflags.split_whitespace() {
            cmd.arg(flag);
        }
        cmd.arg("-o").arg(&exe_path);
    }

    if req.verbose {
        debug!(?cmd, "executing compiler");
    }

    let output = cmd.output().map_err(|e| CompileError::Link(LinkError { code: None, stderr: e.to_string() }))?;
    if !output.status.success() {
        return Err(CompileError::Link(LinkError {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }));
    }

    Ok(exe_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detect_backend_matches_substrings() {
        assert_eq!(BackendType::detect_from_command("tcc"), BackendType::TinyCc);
        assert_eq!(BackendType::detect_from_command("/usr/bin/clang-17"), BackendType::Clang);
        assert_eq!(BackendType::detect_from_command("cl.exe"), BackendType::Msvc);
        assert_eq!(BackendType::detect_from_command("gcc-13"), BackendType::Gcc);
        assert_eq!(BackendType::detect_from_command("cc"), BackendType::Gcc);
    }

    #[test]
    fn clang_checked_before_cl_substring() {
        // "clang" contains no "cl" standalone word but does contain the
        // substring "cl" - must not be misdetected as MSVC.
        assert_eq!(BackendType::detect_from_command("clang"), BackendType::Clang);
    }

    #[test]
    fn filter_tinycc_flags_strips_unsupported_flags() {
        let filtered = filter_tinycc_flags("-O3 -flto -fsanitize=address -g");
        assert_eq!(filtered, "-O3 -g");
    }

    #[test]
    fn filter_tinycc_flags_preserves_order_and_whitespace() {
        let filtered = filter_tinycc_flags("-g   -O2");
        assert_eq!(filtered, "-g -O2");
    }

    #[test]
    fn translate_lib_name_only_maps_on_windows() {
        if cfg!(windows) {
            assert_eq!(translate_lib_name("z"), "zlib");
        } else {
            assert_eq!(translate_lib_name("z"), "z");
        }
    }

    #[test]
    fn transitive_deps_openssl_trigger_on_ssl_or_crypto() {
        let deps = transitive_deps(&["ssl".to_string()]);
        assert!(!deps.is_empty());
        let deps2 = transitive_deps(&["crypto".to_string()]);
        assert!(!deps2.is_empty());
    }

    #[test]
    fn transitive_deps_empty_for_unrelated_libs() {
        assert!(transitive_deps(&["m".to_string()]).is_empty());
    }

    #[test]
    fn parse_config_line_ignores_comments_and_blank_lines() {
        let mut cfg = CfgFile::default();
        parse_config_line(&mut cfg, "# a comment");
        parse_config_line(&mut cfg, "");
        parse_config_line(&mut cfg, "SN_CC=clang");
        assert_eq!(cfg.cc, Some("clang".to_string()));
    }

    #[test]
    fn init_config_env_var_overrides_config_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("sn.cfg"), "SN_CC=tcc\n").unwrap();
        env::set_var("SN_CC", "clang");
        let config = init_config(dir.path());
        assert_eq!(config.cc, "clang");
        env::remove_var("SN_CC");
    }

    #[test]
    fn init_config_falls_back_to_file_then_default() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("sn.cfg"), "SN_STD=c11\n").unwrap();
        env::remove_var("SN_CC");
        env::remove_var("SN_STD");
        let config = init_config(dir.path());
        assert_eq!(config.std, "c11");
    }

    #[test]
    fn validate_pragma_sources_reports_missing_file() {
        let sources = vec![PragmaSourceFile {
            value: "nope.c".to_string(),
            source_dir: "/tmp/does/not/exist".to_string(),
            filename: "main.sn".to_string(),
            line: 3,
        }];
        assert!(validate_pragma_sources(&sources).is_err());
    }

    #[test]
    fn validate_pragma_sources_accepts_existing_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("support.c"), "int x;").unwrap();
        let sources = vec![PragmaSourceFile {
            value: "support.c".to_string(),
            source_dir: dir.path().display().to_string(),
            filename: "main.sn".to_string(),
            line: 3,
        }];
        assert!(validate_pragma_sources(&sources).is_ok());
    }

    #[test]
    fn lib_subdir_differs_per_backend() {
        assert_eq!(BackendType::TinyCc.lib_subdir(), "lib/tinycc");
        assert_eq!(BackendType::Msvc.lib_subdir(), "lib/msvc");
    }
}
