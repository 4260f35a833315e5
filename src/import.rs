//! Import resolution: path algorithm, dedup cache, namespace policy
//! (spec.md §4.3).
//!
//! The cache itself never calls back into the parser — it hands the caller
//! an `Action` describing what to do and lets the parser own the actual
//! recursive-parse call, avoiding a dependency cycle between this module and
//! `parser`. This is the "shared handle-to-vector construct" spec.md §9
//! recommends in place of the source's pointer-to-pointer array.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::Stmt;
use crate::error::ImportError;
use crate::intern::Symbol;

/// One module's cache slot. `stmts` is `None` while the slot is reserved but
/// its recursive parse hasn't returned yet — the state a cyclic import sees.
struct ImportEntry<'a> {
    stmts: Option<&'a [&'a Stmt<'a>]>,
    imported_directly: bool,
    namespace_code_emitted: bool,
}

#[derive(Default)]
pub struct ImportCache<'a> {
    index: std::collections::HashMap<String, usize>,
    entries: Vec<ImportEntry<'a>>,
}

/// Shared, interior-mutable handle threaded through the recursive import
/// walk — every nested `Parser` instance for the same top-level compile
/// clones this `Rc` rather than re-creating its own cache.
pub type ImportContext<'a> = Rc<RefCell<ImportCache<'a>>>;

pub fn new_import_context<'a>() -> ImportContext<'a> {
    Rc::new(RefCell::new(ImportCache::default()))
}

/// What the parser should do with the `STMT_IMPORT` it just parsed.
pub enum Action<'a> {
    /// Already merged under some earlier direct import of the same module;
    /// drop this `STMT_IMPORT` with no further action.
    DropDuplicate,
    /// Merge `stmts` into the importer's module in place and drop the
    /// `STMT_IMPORT` node entirely.
    MergeDirect { stmts: &'a [&'a Stmt<'a>] },
    /// Keep the `STMT_IMPORT`, with `imported_stmts` set to `stmts` and
    /// `namespace_code_emitted` telling the importer whether this site is
    /// the one responsible for emitting the module's code.
    KeepNamespaced { stmts: &'a [&'a Stmt<'a>], emits_code: bool },
}

impl<'a> ImportCache<'a> {
    pub fn index_of(&self, canonical_path: &str) -> Option<usize> {
        self.index.get(canonical_path).copied()
    }

    fn reserve(&mut self, canonical_path: &str, namespaced: bool) -> usize {
        let idx = self.entries.len();
        self.entries.push(ImportEntry {
            stmts: None,
            imported_directly: !namespaced,
            namespace_code_emitted: namespaced,
        });
        self.index.insert(canonical_path.to_string(), idx);
        idx
    }

    fn set_stmts(&mut self, idx: usize, stmts: &'a [&'a Stmt<'a>]) {
        self.entries[idx].stmts = Some(stmts);
    }

    /// Implements spec.md §4.3's processing-rules table. `parse_fn` performs
    /// the actual recursive parse and is only invoked for a not-yet-cached
    /// module; it must not be called while holding a borrow of this cache
    /// (the caller drops its `RefCell` borrow before invoking it).
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        ctx: &ImportContext<'a>,
        canonical_path: &str,
        namespace: Option<Symbol>,
        parse_fn: impl FnOnce() -> Result<&'a [&'a Stmt<'a>], ImportError>,
    ) -> Result<Action<'a>, ImportError> {
        let existing = ctx.borrow().index_of(canonical_path);

        match existing {
            None => {
                let idx = ctx.borrow_mut().reserve(canonical_path, namespace.is_some());
                let stmts = parse_fn()?;
                ctx.borrow_mut().set_stmts(idx, stmts);
                if namespace.is_none() {
                    Ok(Action::MergeDirect { stmts })
                } else {
                    Ok(Action::KeepNamespaced { stmts, emits_code: true })
                }
            }
            Some(idx) => {
                let stmts = ctx.borrow().entries[idx].stmts.unwrap_or(&[]);
                match namespace {
                    None => {
                        let was_direct = ctx.borrow().entries[idx].imported_directly;
                        if was_direct {
                            Ok(Action::DropDuplicate)
                        } else {
                            ctx.borrow_mut().entries[idx].imported_directly = true;
                            Ok(Action::MergeDirect { stmts })
                        }
                    }
                    Some(_) => {
                        let already_claimed = {
                            let cache = ctx.borrow();
                            cache.entries[idx].imported_directly || cache.entries[idx].namespace_code_emitted
                        };
                        if already_claimed {
                            Ok(Action::KeepNamespaced { stmts, emits_code: false })
                        } else {
                            ctx.borrow_mut().entries[idx].namespace_code_emitted = true;
                            Ok(Action::KeepNamespaced { stmts, emits_code: true })
                        }
                    }
                }
            }
        }
    }
}

/// Removes `./` components and normalises `\` to `/` (both are treated as
/// separators throughout, per spec.md §4.3 step 1).
pub fn normalize_path(p: &str) -> String {
    let parts: Vec<&str> = p
        .split(|c| c == '/' || c == '\\')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    parts.join("/")
}

fn candidate_path(importer_dir: &str, module_name: &str) -> String {
    normalize_path(&format!("{importer_dir}/{module_name}.sn"))
}

/// SDK root search order (spec.md §4.3 step 3): `SN_SDK` env var, the
/// compiler directory's `sdk/` sibling, `../lib/sindarin/sdk/`, then a
/// built-in default.
pub fn sdk_roots(compiler_dir: Option<&str>) -> Vec<String> {
    let mut roots = Vec::new();
    if let Ok(env_root) = std::env::var("SN_SDK") {
        roots.push(env_root);
    }
    if let Some(cd) = compiler_dir {
        roots.push(normalize_path(&format!("{cd}/sdk")));
    }
    roots.push("../lib/sindarin/sdk".to_string());
    roots.push("/usr/local/lib/sindarin/sdk".to_string());
    roots
}

/// Path-resolution algorithm for `import "M"` inside file whose directory is
/// `importer_dir` (spec.md §4.3). `exists` is injected so callers can test
/// this without touching the filesystem.
pub fn resolve_import_path(
    importer_dir: &str,
    module_name: &str,
    compiler_dir: Option<&str>,
    exists: impl Fn(&str) -> bool,
) -> Result<String, ImportError> {
    let candidate = candidate_path(importer_dir, module_name);
    if exists(&candidate) {
        return Ok(candidate);
    }
    for root in sdk_roots(compiler_dir) {
        let sdk_candidate = normalize_path(&format!("{root}/sdk/{module_name}.sn"));
        if exists(&sdk_candidate) {
            return Ok(sdk_candidate);
        }
    }
    Err(ImportError::ModuleNotFound { name: module_name.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn path_normalisation_strips_dot_components() {
        assert_eq!(normalize_path("dir/./file.sn"), normalize_path("dir/file.sn"));
        assert_eq!(normalize_path("dir/./file.sn"), "dir/file.sn");
    }

    #[test]
    fn path_normalisation_treats_backslash_as_separator() {
        assert_eq!(normalize_path("dir\\file.sn"), "dir/file.sn");
    }

    #[test]
    fn resolve_import_path_prefers_sibling_file() {
        let existing: HashSet<&str> = ["a/util.sn"].into_iter().collect();
        let path = resolve_import_path("a", "util", None, |p| existing.contains(p)).unwrap();
        assert_eq!(path, "a/util.sn");
    }

    #[test]
    fn resolve_import_path_falls_back_to_sdk_env_root() {
        std::env::set_var("SN_SDK", "/tmp/sdk");
        let existing: HashSet<&str> = ["/tmp/sdk/sdk/math.sn"].into_iter().collect();
        let path = resolve_import_path("a", "math", None, |p| existing.contains(p)).unwrap();
        assert_eq!(path, "/tmp/sdk/sdk/math.sn");
        std::env::remove_var("SN_SDK");
    }

    #[test]
    fn resolve_import_path_reports_missing_module() {
        let err = resolve_import_path("a", "nope", None, |_| false).unwrap_err();
        assert!(matches!(err, ImportError::ModuleNotFound { .. }));
    }

    #[test]
    fn first_direct_import_reserves_and_parses() {
        let ctx = new_import_context();
        let mut calls = 0;
        let action = ImportCache::resolve(&ctx, "a/util.sn", None, || {
            calls += 1;
            Ok(&[][..])
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert!(matches!(action, Action::MergeDirect { .. }));
    }

    #[test]
    fn duplicate_direct_import_is_dropped_without_reparsing() {
        let ctx = new_import_context();
        ImportCache::resolve(&ctx, "a/util.sn", None, || Ok(&[][..])).unwrap();
        let mut calls = 0;
        let action = ImportCache::resolve(&ctx, "a/util.sn", None, || {
            calls += 1;
            Ok(&[][..])
        })
        .unwrap();
        assert_eq!(calls, 0);
        assert!(matches!(action, Action::DropDuplicate));
    }

    #[test]
    fn namespaced_then_direct_promotes_to_merge() {
        let ctx = new_import_context();
        let ns = Symbol::default();
        ImportCache::resolve(&ctx, "a/util.sn", Some(ns), || Ok(&[][..])).unwrap();
        let action = ImportCache::resolve(&ctx, "a/util.sn", None, || Ok(&[][..])).unwrap();
        assert!(matches!(action, Action::MergeDirect { .. }));
    }

    #[test]
    fn diamond_namespace_import_emits_exactly_once() {
        let ctx = new_import_context();
        let ns_b = Symbol::default();
        let first = ImportCache::resolve(&ctx, "sdk/d.sn", Some(ns_b), || Ok(&[][..])).unwrap();
        let second = ImportCache::resolve(&ctx, "sdk/d.sn", Some(ns_b), || Ok(&[][..])).unwrap();
        let first_emits = matches!(first, Action::KeepNamespaced { emits_code: true, .. });
        let second_emits = matches!(second, Action::KeepNamespaced { emits_code: true, .. });
        assert!(first_emits && !second_emits);
    }

    #[test]
    fn circular_import_is_a_no_op_on_the_cyclic_edge() {
        let ctx = new_import_context();
        // Simulates A importing B importing A: the outer resolve reserves
        // "a.sn" then, inside its own parse_fn, resolves "a.sn" again before
        // the outer one has stored any statements.
        let action = ImportCache::resolve(&ctx, "a.sn", None, || {
            let inner = ImportCache::resolve(&ctx, "a.sn", None, || Ok(&[][..]));
            assert!(matches!(inner, Ok(Action::DropDuplicate)));
            Ok(&[][..])
        })
        .unwrap();
        assert!(matches!(action, Action::MergeDirect { .. }));
    }
}
