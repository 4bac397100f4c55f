//! Resource URL templates

use super::tile_id::TileId;

/// Values substituted into a [`UrlTemplate`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UrlVars {
    pub tile: TileId,
    /// Submesh index
    pub sub: u32,
}

impl UrlVars {
    pub fn new(tile: TileId) -> Self {
        Self { tile, sub: 0 }
    }

    pub fn with_sub(mut self, sub: u32) -> Self {
        self.sub = sub;
        self
    }
}

/// URL with `{lod}`, `{x}`, `{y}` and `{sub}` placeholders
///
/// Unknown placeholders are copied through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn expand(&self, vars: &UrlVars) -> String {
        let mut out = String::with_capacity(self.template.len() + 16);
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return out;
            };
            match &after[..close] {
                "lod" => out.push_str(&vars.tile.lod.to_string()),
                "x" => out.push_str(&vars.tile.x.to_string()),
                "y" => out.push_str(&vars.tile.y.to_string()),
                "sub" => out.push_str(&vars.sub.to_string()),
                other => {
                    out.push('{');
                    out.push_str(other);
                    out.push('}');
                }
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Resolve `url` against the directory of `base`
///
/// Absolute URLs (with a scheme or a leading `/`) are returned as is.
pub fn resolve_relative(url: &str, base: &str) -> String {
    if url.contains("://") || url.starts_with('/') {
        return url.to_string();
    }
    match base.rfind('/') {
        Some(slash) => format!("{}{}", &base[..=slash], url),
        None => url.to_string(),
    }
}
