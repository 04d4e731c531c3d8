// ABOUTME: Flake input resolution and outputs-lambda invocation (spec §4.F)
//
// Network fetching is explicitly out of scope for the evaluator core (§1);
// it is an external collaborator reached through the `Fetcher` trait here,
// the same boundary pattern `io.rs::IoHandle` uses for the filesystem.

use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::io::IoHandle;
use crate::store;
use crate::value::{AttrSet, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A parsed flake reference (spec §6 "Flake reference grammar").
#[derive(Debug, Clone, PartialEq)]
pub enum FlakeRef {
    Path(PathBuf),
    GitHub { owner: String, repo: String, ref_or_rev: Option<String> },
    GitLab { owner: String, repo: String, ref_or_rev: Option<String> },
    Git { url: String },
    Tarball { url: String },
    /// A bare identifier, resolved through the registry.
    Indirect { id: String },
}

/// Parses a flake reference per the grammar in spec §6. Query parameters
/// (`?rev=…&ref=…&dir=…`) on `github:`/`gitlab:` refs are folded into a
/// single trailing ref-or-rev string for simplicity; the driver does not
/// need to distinguish `rev=` from `ref=` beyond "what to check out".
pub fn parse_flake_ref(s: &str) -> FlakeRef {
    if s == "." || s.starts_with("./") || s.starts_with('/') {
        return FlakeRef::Path(PathBuf::from(s));
    }
    if let Some(rest) = s.strip_prefix("github:") {
        return parse_forge_ref(rest, true);
    }
    if let Some(rest) = s.strip_prefix("gitlab:") {
        return parse_forge_ref(rest, false);
    }
    if let Some(url) = s.strip_prefix("git+") {
        return FlakeRef::Git { url: url.to_string() };
    }
    if s.starts_with("https://") || s.starts_with("http://") {
        return FlakeRef::Tarball { url: s.to_string() };
    }
    FlakeRef::Indirect { id: s.to_string() }
}

fn parse_forge_ref(rest: &str, is_github: bool) -> FlakeRef {
    let (path, _query) = rest.split_once('?').unwrap_or((rest, ""));
    let mut parts = path.splitn(3, '/');
    let owner = parts.next().unwrap_or_default().to_string();
    let repo = parts.next().unwrap_or_default().to_string();
    let ref_or_rev = parts.next().map(|s| s.to_string());
    if is_github {
        FlakeRef::GitHub { owner, repo, ref_or_rev }
    } else {
        FlakeRef::GitLab { owner, repo, ref_or_rev }
    }
}

/// Looks up a bare identifier in the built-in registry, per spec §4.F ("consults
/// the registry for indirect refs: `nixpkgs` -> `github:NixOS/nixpkgs`, etc.").
fn registry_lookup(id: &str) -> Option<&'static str> {
    match id {
        "nixpkgs" => Some("github:NixOS/nixpkgs"),
        "flake-utils" => Some("github:numtide/flake-utils"),
        "home-manager" => Some("github:nix-community/home-manager"),
        _ => None,
    }
}

/// Resolves an `Indirect` ref through the registry, leaving all other kinds
/// untouched.
fn resolve_indirect(r: FlakeRef) -> Result<FlakeRef, EvalError> {
    match r {
        FlakeRef::Indirect { id } => match registry_lookup(&id) {
            Some(target) => Ok(parse_flake_ref(target)),
            None => Err(EvalError::InvalidFlake(format!("no registry entry for '{id}'"))),
        },
        other => Ok(other),
    }
}

/// The result of fetching a flake ref: where it landed and, for
/// revision-addressed sources, what revision was checked out.
pub struct Fetched {
    pub out_path: String,
    pub rev: Option<String>,
}

/// The network-fetch boundary (see module doc). Local `Path` refs never
/// reach this trait; the driver resolves them directly.
pub trait Fetcher {
    fn fetch(&self, r: &FlakeRef) -> Result<Fetched, EvalError>;
}

/// Fetches `github:`/`gitlab:` refs as tarballs and `git+`/`https?://` refs
/// directly, via `ureq`. Does not unpack the archive (see `builtins::fetch`'s
/// module doc for the same limitation and its rationale); the returned path
/// is a content-addressed reference to the fetched bytes.
pub struct TarballFetcher;

impl TarballFetcher {
    fn tarball_url(r: &FlakeRef) -> Result<String, EvalError> {
        match r {
            FlakeRef::GitHub { owner, repo, ref_or_rev } => {
                let rev = ref_or_rev.clone().unwrap_or_else(|| "HEAD".to_string());
                Ok(format!("https://github.com/{owner}/{repo}/archive/{rev}.tar.gz"))
            }
            FlakeRef::GitLab { owner, repo, ref_or_rev } => {
                let rev = ref_or_rev.clone().unwrap_or_else(|| "HEAD".to_string());
                Ok(format!("https://gitlab.com/{owner}/{repo}/-/archive/{rev}/{repo}-{rev}.tar.gz"))
            }
            FlakeRef::Tarball { url } | FlakeRef::Git { url } => Ok(url.clone()),
            other => Err(EvalError::InvalidFlake(format!("not a fetchable ref: {other:?}"))),
        }
    }
}

impl Fetcher for TarballFetcher {
    fn fetch(&self, r: &FlakeRef) -> Result<Fetched, EvalError> {
        let url = Self::tarball_url(r)?;
        let response = ureq::get(&url).call().map_err(|e| EvalError::InvalidFlake(format!("fetch {url}: {e}")))?;
        let mut bytes = Vec::new();
        use std::io::Read;
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| EvalError::InvalidFlake(format!("fetch {url}: {e}")))?;
        let digest = store::sha256_bytes(&bytes);
        let out_path = store::store_path_from_hash(&digest, "source", crate::config::STORE_DIR);
        let rev = match r {
            FlakeRef::GitHub { ref_or_rev, .. } | FlakeRef::GitLab { ref_or_rev, .. } => ref_or_rev.clone(),
            _ => None,
        };
        Ok(Fetched { out_path, rev })
    }
}

/// A deterministic, network-free fetcher for tests: hashes the ref's debug
/// representation instead of reaching the network.
pub struct StubFetcher;

impl Fetcher for StubFetcher {
    fn fetch(&self, r: &FlakeRef) -> Result<Fetched, EvalError> {
        let digest = store::sha256_bytes(format!("{r:?}").as_bytes());
        let out_path = store::store_path_from_hash(&digest, "source", crate::config::STORE_DIR);
        Ok(Fetched { out_path, rev: None })
    }
}

/// One `inputs.<name> = { ... }` entry, after both the nested and the
/// flattened dotted forms have already been normalised into nested
/// attribute sets by the evaluator's own dotted-path merging (spec §4.P) —
/// by the time this module sees the `inputs` value, both forms are
/// indistinguishable.
struct InputSpec {
    url: Option<String>,
    flake: bool,
    follows: Option<String>,
    /// Nested `inputs.X.inputs.Y.follows = "Z";` overrides to apply to X's
    /// own flake when it is loaded as a sub-flake.
    overrides: BTreeMap<String, InputSpec>,
}

fn parse_input_spec(set: &AttrSet) -> InputSpec {
    let url = match set.get("url") {
        Some(Value::Str(s)) => Some(s.to_string()),
        _ => None,
    };
    let flake = !matches!(set.get("flake"), Some(Value::Bool(false)));
    let follows = match set.get("follows") {
        Some(Value::Str(s)) => Some(s.to_string()),
        _ => None,
    };
    let overrides = match set.get("inputs") {
        Some(Value::AttrSet(sub)) => sub
            .iter()
            .filter_map(|(k, v)| v.as_attrset().map(|s| (k.to_string(), parse_input_spec(s))))
            .collect(),
        _ => BTreeMap::new(),
    };
    InputSpec { url, flake, follows, overrides }
}

/// A resolved input, ready to be spliced into the `inputs` argument passed
/// to the outputs lambda.
struct ResolvedInput {
    value: Value,
    /// Sub-flake's own resolved inputs, used to chase `follows` chains that
    /// cross into a child flake (`follows = "a/b"` walks through `a`'s
    /// resolved inputs to find `b`).
    sub_resolved: BTreeMap<String, Value>,
}

/// Loads `<root>/flake.nix`, resolves its inputs, and applies the outputs
/// lambda, returning the resulting outputs attribute set.
///
/// `parent_resolved` is `Some` when this call is itself resolving a
/// sub-flake's inputs on behalf of a parent (`follows` may walk into it);
/// `overrides` carries any `inputs.<name>.inputs.<sub>.follows` redirects
/// the parent declared for this sub-flake.
pub fn load_flake(
    root: &Path,
    ev: &mut Evaluator,
    fetcher: &dyn Fetcher,
    parent_resolved: Option<&BTreeMap<String, Value>>,
    overrides: &BTreeMap<String, InputSpec>,
) -> Result<Value, EvalError> {
    let flake_path = root.join("flake.nix");
    let flake_path_str = flake_path.to_string_lossy().into_owned();
    let src = ev.io.read_file(&flake_path_str).map_err(|e| EvalError::FileNotFound(e.to_string()))?;
    let expr = crate::parser::parse(&src, flake_path_str.clone(), root.to_path_buf())?;
    let flake_val = ev.force(ev.eval(&expr, &ev.global.clone())?)?;
    let flake_set = flake_val
        .as_attrset()
        .ok_or_else(|| EvalError::InvalidFlake("flake.nix must evaluate to an attribute set".to_string()))?;

    let outputs_fn = flake_set
        .get("outputs")
        .cloned()
        .ok_or_else(|| EvalError::InvalidFlake("flake.nix has no 'outputs'".to_string()))?;
    let outputs_fn = ev.force(outputs_fn)?;

    let input_specs: BTreeMap<String, InputSpec> = match flake_set.get("inputs") {
        Some(v) => {
            let forced = ev.force(v.clone())?;
            let set = forced
                .as_attrset()
                .ok_or_else(|| EvalError::InvalidFlake("'inputs' must be a set".to_string()))?;
            set.iter()
                .filter_map(|(k, v)| {
                    let forced = ev.force(v.clone()).ok()?;
                    forced.as_attrset().map(|s| (k.to_string(), parse_input_spec(s)))
                })
                .collect()
        }
        None => BTreeMap::new(),
    };

    // Pass 1: resolve everything that does not use `follows`.
    let mut resolved: BTreeMap<String, ResolvedInput> = BTreeMap::new();
    for (name, spec) in input_specs.iter() {
        if spec.follows.is_some() {
            continue;
        }
        let effective = overrides.get(name).unwrap_or(spec);
        let url = effective
            .url
            .as_ref()
            .ok_or_else(|| EvalError::InvalidFlake(format!("input '{name}' has neither 'url' nor 'follows'")))?;
        let r = resolve_indirect(parse_flake_ref(url))?;

        let (out_path, rev) = match &r {
            FlakeRef::Path(p) => (p.to_string_lossy().into_owned(), None),
            other => match fetcher.fetch(other) {
                Ok(fetched) => (fetched.out_path, fetched.rev),
                Err(e) => {
                    log::warn!("input '{name}' failed to fetch, skipping: {e}");
                    continue;
                }
            },
        };

        let mut sub_resolved = BTreeMap::new();
        let mut entry_set = AttrSet::new();
        entry_set.insert(Rc::from("outPath"), Value::Path(Rc::from(out_path.as_str())));
        if let Some(rev) = &rev {
            entry_set.insert(Rc::from("rev"), Value::Str(Rc::from(rev.as_str())));
        }

        if effective.flake && ev.io.path_exists(&format!("{out_path}/flake.nix")) {
            let sub_outputs =
                load_flake(Path::new(&out_path), ev, fetcher, Some(&Default::default()), &effective.overrides)?;
            if let Some(sub_set) = sub_outputs.as_attrset() {
                for (k, v) in sub_set.iter() {
                    sub_resolved.insert(k.to_string(), v.clone());
                    entry_set.insert(k.clone(), v.clone());
                }
            }
        }

        resolved.insert(name.clone(), ResolvedInput { value: Value::AttrSet(Rc::new(entry_set)), sub_resolved });
    }

    // Pass 2: resolve `follows = "a/b"` by walking first through this
    // flake's own already-resolved inputs, then the parent's.
    for (name, spec) in input_specs.iter() {
        let Some(path) = &spec.follows else { continue };
        if path.is_empty() {
            continue; // an empty follows string removes the sub-input.
        }
        if let Some(value) = resolve_follows_path(path, &resolved, parent_resolved) {
            resolved.insert(name.clone(), ResolvedInput { value, sub_resolved: BTreeMap::new() });
        }
    }

    // Build the `inputs` argument: `self` plus every resolved input.
    let mut inputs_set = AttrSet::new();
    let mut self_set = AttrSet::new();
    self_set.insert(Rc::from("outPath"), Value::Path(Rc::from(root.to_string_lossy().as_ref())));
    inputs_set.insert(Rc::from("self"), Value::AttrSet(Rc::new(self_set)));
    for (name, input) in resolved {
        inputs_set.insert(Rc::from(name.as_str()), input.value);
    }

    ev.call(outputs_fn, Value::AttrSet(Rc::new(inputs_set)))
}

fn resolve_follows_path(
    path: &str,
    resolved: &BTreeMap<String, ResolvedInput>,
    parent_resolved: Option<&BTreeMap<String, Value>>,
) -> Option<Value> {
    let mut segments = path.split('/');
    let first = segments.next()?;
    if let Some(input) = resolved.get(first) {
        let mut value = input.value.clone();
        for seg in segments {
            if let Some(sub) = input.sub_resolved.get(seg) {
                value = sub.clone();
            } else if let Some(set) = value.as_attrset() {
                value = set.get(seg)?.clone();
            } else {
                return None;
            }
        }
        return Some(value);
    }
    parent_resolved?.get(first).cloned()
}

/// Resolves just the root flake's direct, non-`follows` input refs (no
/// sub-flake recursion, no outputs-lambda invocation) for `flake lock`'s
/// benefit: the lock file only needs to name what each input points at and
/// which revision was fetched.
pub fn lock_root_inputs(
    root: &Path,
    ev: &mut Evaluator,
    fetcher: &dyn Fetcher,
) -> Result<BTreeMap<String, (FlakeRef, Option<String>)>, EvalError> {
    let flake_path = root.join("flake.nix");
    let flake_path_str = flake_path.to_string_lossy().into_owned();
    let src = ev.io.read_file(&flake_path_str).map_err(|e| EvalError::FileNotFound(e.to_string()))?;
    let expr = crate::parser::parse(&src, flake_path_str.clone(), root.to_path_buf())?;
    let flake_val = ev.force(ev.eval(&expr, &ev.global.clone())?)?;
    let flake_set = flake_val
        .as_attrset()
        .ok_or_else(|| EvalError::InvalidFlake("flake.nix must evaluate to an attribute set".to_string()))?;

    let mut out = BTreeMap::new();
    let Some(inputs_val) = flake_set.get("inputs") else { return Ok(out) };
    let forced = ev.force(inputs_val.clone())?;
    let Some(set) = forced.as_attrset() else { return Ok(out) };
    for (name, v) in set.iter() {
        let forced = ev.force(v.clone())?;
        let Some(spec_set) = forced.as_attrset() else { continue };
        let spec = parse_input_spec(spec_set);
        if spec.follows.is_some() {
            continue;
        }
        let Some(url) = &spec.url else { continue };
        let r = resolve_indirect(parse_flake_ref(url))?;
        let rev = match &r {
            FlakeRef::Path(_) => None,
            other => fetcher.fetch(other).ok().and_then(|f| f.rev),
        };
        out.insert(name.to_string(), (r, rev));
    }
    Ok(out)
}

/// Serialises a resolved input set into the JSON lock-file shape (spec §6):
/// `{"version":7,"root":"root","nodes":{...}}`.
pub fn render_lock_file(root_inputs: &BTreeMap<String, (FlakeRef, Option<String>)>) -> serde_json::Value {
    let mut nodes = serde_json::Map::new();
    let mut root_node_inputs = serde_json::Map::new();
    for (name, (flake_ref, rev)) in root_inputs {
        root_node_inputs.insert(name.clone(), serde_json::Value::String(name.clone()));
        nodes.insert(name.clone(), serde_json::json!({ "locked": locked_block(flake_ref, rev) }));
    }
    nodes.insert("root".to_string(), serde_json::json!({ "inputs": root_node_inputs }));
    serde_json::json!({ "version": 7, "root": "root", "nodes": nodes })
}

fn locked_block(r: &FlakeRef, rev: &Option<String>) -> serde_json::Value {
    match r {
        FlakeRef::GitHub { owner, repo, .. } => serde_json::json!({
            "type": "github", "owner": owner, "repo": repo, "rev": rev,
        }),
        FlakeRef::GitLab { owner, repo, .. } => serde_json::json!({
            "type": "gitlab", "owner": owner, "repo": repo, "rev": rev,
        }),
        FlakeRef::Git { url } => serde_json::json!({ "type": "git", "url": url }),
        FlakeRef::Tarball { url } => serde_json::json!({ "type": "tarball", "url": url }),
        FlakeRef::Path(p) => serde_json::json!({ "type": "path", "path": p.to_string_lossy() }),
        FlakeRef::Indirect { id } => serde_json::json!({ "type": "indirect", "id": id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_github_ref_with_rev() {
        let r = parse_flake_ref("github:NixOS/nixpkgs/release-23.11");
        assert_eq!(
            r,
            FlakeRef::GitHub { owner: "NixOS".to_string(), repo: "nixpkgs".to_string(), ref_or_rev: Some("release-23.11".to_string()) }
        );
    }

    #[test]
    fn parses_path_refs() {
        assert_eq!(parse_flake_ref("."), FlakeRef::Path(PathBuf::from(".")));
        assert_eq!(parse_flake_ref("./sub"), FlakeRef::Path(PathBuf::from("./sub")));
        assert_eq!(parse_flake_ref("/abs/path"), FlakeRef::Path(PathBuf::from("/abs/path")));
    }

    #[test]
    fn indirect_resolves_through_registry() {
        let r = resolve_indirect(FlakeRef::Indirect { id: "nixpkgs".to_string() }).unwrap();
        assert_eq!(r, FlakeRef::GitHub { owner: "NixOS".to_string(), repo: "nixpkgs".to_string(), ref_or_rev: None });
    }

    #[test]
    fn unknown_registry_name_errors() {
        assert!(resolve_indirect(FlakeRef::Indirect { id: "not-a-real-registry-name".to_string() }).is_err());
    }

    #[test]
    fn stub_fetcher_is_deterministic() {
        let f = StubFetcher;
        let r = FlakeRef::GitHub { owner: "a".to_string(), repo: "b".to_string(), ref_or_rev: None };
        let a = f.fetch(&r).unwrap();
        let b = f.fetch(&r).unwrap();
        assert_eq!(a.out_path, b.out_path);
    }

    #[test]
    fn lock_file_has_expected_shape() {
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "nixpkgs".to_string(),
            (FlakeRef::GitHub { owner: "NixOS".to_string(), repo: "nixpkgs".to_string(), ref_or_rev: None }, Some("abc123".to_string())),
        );
        let lock = render_lock_file(&inputs);
        assert_eq!(lock["version"], 7);
        assert_eq!(lock["root"], "root");
        assert_eq!(lock["nodes"]["nixpkgs"]["locked"]["type"], "github");
    }
}
