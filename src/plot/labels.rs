//! Display names of chart rows.

use once_cell::sync::Lazy;
use regex::Regex;

static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|_)\d+").unwrap());

/// Prefixes left over from module paths that only add noise.
const STRIP: [&str; 3] = ["self_", "transformer_h_", "transformer_"];

/// Drops numeric index tokens (`_12`, a leading `3`) and structural
/// prefixes from a layer name.
pub fn clean_layer_name(name: &str) -> String {
    let mut s = INDEX_RE.replace_all(name, "").into_owned();
    for prefix in STRIP {
        s = s.replace(prefix, "");
    }
    s
}
