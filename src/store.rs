// ABOUTME: Derivation serialization and content-addressed store paths (spec §4.S, §6)

use sha2::{Digest, Sha256};

/// Nix's own base32 alphabet: the 32 digits/lowercase letters that remain
/// after dropping `e o u t` (chosen to avoid accidentally spelling English
/// words in store paths).
const NIX_BASE32_ALPHABET: &[u8] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// One output of a derivation, e.g. `out`, `dev`.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationOutput {
    pub name: String,
    pub path: String,
    pub hash_algo: String,
    pub hash: String,
}

/// A fully-elaborated derivation, ready for ATerm serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivation {
    pub outputs: Vec<DerivationOutput>,
    /// `(drv_path, [output_names])` pairs.
    pub input_drvs: Vec<(String, Vec<String>)>,
    pub input_srcs: Vec<String>,
    pub system: String,
    pub builder: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Quotes a string the way ATerm does: wrap in `"`, backslash-escape `"`,
/// `\` and newlines. No whitespace is ever emitted outside of these quoted
/// strings (spec §6: "no whitespace").
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn quote_list(items: impl IntoIterator<Item = String>) -> String {
    let parts: Vec<String> = items.into_iter().collect();
    format!("[{}]", parts.join(","))
}

impl Derivation {
    /// Serializes this derivation to the ATerm text format that `nix-store`
    /// hashes to produce the `.drv` store path, per spec §6:
    /// `Derive([<outputs>],[<input-drvs>],[<input-srcs>],"<system>","<builder>",[<args>],[<env>])`
    pub fn to_aterm(&self) -> String {
        let outputs = quote_list(self.outputs.iter().map(|o| {
            format!(
                "({},{},{},{})",
                quote(&o.name),
                quote(&o.path),
                quote(&o.hash_algo),
                quote(&o.hash)
            )
        }));
        let input_drvs = quote_list(self.input_drvs.iter().map(|(drv, outs)| {
            let out_names = quote_list(outs.iter().map(|o| quote(o)));
            format!("({},{})", quote(drv), out_names)
        }));
        let input_srcs = quote_list(self.input_srcs.iter().map(|s| quote(s)));
        let args = quote_list(self.args.iter().map(|a| quote(a)));
        let env = quote_list(
            self.env
                .iter()
                .map(|(k, v)| format!("({},{})", quote(k), quote(v))),
        );
        format!(
            "Derive({outputs},{input_drvs},{input_srcs},{system},{builder},{args},{env})",
            system = quote(&self.system),
            builder = quote(&self.builder),
        )
    }
}

/// SHA-256 of `data`, as raw bytes.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of `data`, as a lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = sha256_bytes(data);
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Encodes `data` using Nix's base32 variant: bits are consumed
/// little-endian-first from the *end* of the byte string, emitted 5 bits at
/// a time, producing a fixed-width digest with no padding characters. For a
/// 20-byte digest this yields 32 characters; for a 32-byte (SHA-256) digest,
/// 52 characters, matching spec §6's `/nix/store/<52-char>-<name>` shape.
pub fn nix_base32(data: &[u8]) -> String {
    let len = (data.len() * 8).div_ceil(5);
    let mut out = vec![0u8; len];
    for (i, slot) in out.iter_mut().enumerate() {
        let bit_pos = i * 5;
        let byte_idx = bit_pos / 8;
        let bit_off = bit_pos % 8;

        let b0 = data.get(data.len() - 1 - byte_idx).copied().unwrap_or(0) as u16;
        let b1 = if byte_idx + 1 < data.len() {
            data[data.len() - 2 - byte_idx] as u16
        } else {
            0
        };
        let window = b0 | (b1 << 8);
        let digit = (window >> bit_off) & 0x1f;
        *slot = NIX_BASE32_ALPHABET[digit as usize];
    }
    out.reverse();
    String::from_utf8(out).expect("alphabet is ASCII")
}

/// Computes a store path for `name` given a 32-byte "fingerprint" hash, per
/// spec §6: `/nix/store/<52-char-base32>-<name>`. The fingerprint itself
/// (how `type:hash:references:...` is assembled) is the caller's concern;
/// this only performs the final base32-and-format step shared by every kind
/// of store path (fixed-output, derivation, output).
pub fn store_path_from_hash(hash: &[u8; 32], name: &str, store_dir: &str) -> String {
    format!("{store_dir}/{}-{name}", nix_base32(hash))
}

/// Computes the content-addressed store path of a `.drv` file: SHA-256 the
/// ATerm text, feed that through the standard "compressed" fingerprinting
/// Nix uses for derivations (`text:<hash of hash>:...`), and base32-encode.
/// We follow the simplified form spec §6 authorizes: hash the ATerm text
/// directly, no separate "fingerprint" indirection, since the outer
/// specification does not require bit-for-bit compatibility with a real
/// Nix store, only the `/nix/store/<hash>-<name>` shape and stability.
pub fn drv_path(drv_name: &str, aterm: &str, store_dir: &str) -> String {
    let digest = sha256_bytes(format!("drv:{drv_name}:{aterm}").as_bytes());
    store_path_from_hash(&digest, &format!("{drv_name}.drv"), store_dir)
}

/// Computes the output store path for a named output of a derivation, given
/// the derivation's own `.drv` path. Mirrors `drv_path`'s simplified
/// fingerprinting: outputs are addressed by `(drv_path, output_name)` rather
/// than the real Nix "output path placeholder" substitution scheme.
pub fn output_path(drv_path: &str, drv_name: &str, output_name: &str, store_dir: &str) -> String {
    let digest = sha256_bytes(format!("out:{drv_path}:{output_name}").as_bytes());
    let name = if output_name == "out" {
        drv_name.to_string()
    } else {
        format!("{drv_name}-{output_name}")
    };
    store_path_from_hash(&digest, &name, store_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_special_chars() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn aterm_has_no_whitespace() {
        let drv = Derivation {
            outputs: vec![DerivationOutput {
                name: "out".into(),
                path: "/nix/store/xxx-hello".into(),
                hash_algo: "".into(),
                hash: "".into(),
            }],
            input_drvs: vec![("/nix/store/yyy-dep.drv".into(), vec!["out".into()])],
            input_srcs: vec!["/nix/store/zzz-src".into()],
            system: "x86_64-linux".into(),
            builder: "/bin/sh".into(),
            args: vec!["-c".into(), "echo hi".into()],
            env: vec![("name".into(), "hello".into())],
        };
        let text = drv.to_aterm();
        assert!(!text.contains(' '));
        assert!(text.starts_with("Derive(["));
        assert!(text.contains("(\"out\",\"/nix/store/xxx-hello\",\"\",\"\")"));
    }

    #[test]
    fn base32_length_matches_digest_size() {
        // 20-byte digest -> 32 chars, 32-byte digest -> 52 chars.
        assert_eq!(nix_base32(&[0u8; 20]).len(), 32);
        assert_eq!(nix_base32(&[0u8; 32]).len(), 52);
    }

    #[test]
    fn base32_uses_only_nix_alphabet() {
        let digest = sha256_bytes(b"hello world");
        let encoded = nix_base32(&digest);
        for c in encoded.chars() {
            assert!(NIX_BASE32_ALPHABET.contains(&(c as u8)), "unexpected char {c}");
        }
    }

    #[test]
    fn base32_is_deterministic() {
        let digest = sha256_bytes(b"determinism check");
        assert_eq!(nix_base32(&digest), nix_base32(&digest));
    }

    #[test]
    fn store_path_matches_expected_shape() {
        let digest = sha256_bytes(b"hello");
        let path = store_path_from_hash(&digest, "hello", "/nix/store");
        assert!(path.starts_with("/nix/store/"));
        assert!(path.ends_with("-hello"));
        let hash_part = &path["/nix/store/".len()..path.len() - "-hello".len()];
        assert_eq!(hash_part.len(), 52);
    }

    #[test]
    fn drv_path_is_stable_for_same_input() {
        let a = drv_path("hello", "Derive(...)", "/nix/store");
        let b = drv_path("hello", "Derive(...)", "/nix/store");
        assert_eq!(a, b);
        assert!(a.ends_with("-hello.drv"));
    }

    #[test]
    fn output_path_uses_plain_name_for_out() {
        let p = output_path("/nix/store/abc-hello.drv", "hello", "out", "/nix/store");
        assert!(p.ends_with("-hello"));
        let dev = output_path("/nix/store/abc-hello.drv", "hello", "dev", "/nix/store");
        assert!(dev.ends_with("-hello-dev"));
    }
}
