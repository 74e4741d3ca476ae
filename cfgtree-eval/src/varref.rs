//! Resolution of `$VAR(path)` references inside template programs.
//!
//! A reference is either absolute (`/system/host-name/@`) or relative to
//! the node under evaluation (`../address/@`). Within it, `@` stands for
//! the current node's value, `@@` for each of its values (fanning out
//! over tag values), `.` for the node itself and `..` for its parent
//! (skipping over tag values).

use anyhow::Result;

use cfgtree_schema::ValueType;
use cfgtree_store::{CfgPath, Layer, Marker};

use crate::context::EvalContext;

/// The outcome of resolving one reference: a set of candidate paths,
/// each optionally carrying the value type it produced.
///
/// Entries with no type are bare paths whose existence decides their
/// contribution; typed entries end in a value read from the config.
pub struct VarRef<'a> {
    ctx: &'a EvalContext<'a>,
    active: bool,
    /// The path of the node under evaluation for relative references;
    /// absolute references carry no original path.
    orig: CfgPath,
    paths: Vec<(CfgPath, Option<ValueType>)>,
}

impl<'a> VarRef<'a> {
    /// Resolves `ref_str` against the active or working view.
    pub fn resolve(ctx: &'a EvalContext<'a>, ref_str: &str, active: bool) -> Result<Self> {
        let absolute = ref_str.starts_with('/');
        let comps: Vec<String> = ref_str
            .trim_start_matches('/')
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();
        let orig = if absolute {
            CfgPath::root()
        } else {
            ctx.cfg_path.clone()
        };
        let mut vr = VarRef {
            ctx,
            active,
            orig: orig.clone(),
            paths: Vec::new(),
        };
        vr.process(&comps, orig, None)?;
        Ok(vr)
    }

    fn layer(&self) -> Layer {
        if self.active {
            Layer::Active
        } else {
            Layer::Working
        }
    }

    fn orig(&self) -> &CfgPath {
        &self.orig
    }

    fn process(
        &mut self,
        rcomps: &[String],
        cur: CfgPath,
        vtype: Option<ValueType>,
    ) -> Result<()> {
        let Some((comp, rest)) = rcomps.split_first() else {
            self.paths.push((cur, vtype));
            return Ok(());
        };

        let resolved = self.ctx.registry.try_resolve(&cur)?;
        match comp.as_str() {
            "@" => {
                let Some(r) = resolved else { return Ok(()) };
                let Some(t) = r.tmpl.type1 else {
                    // no value for a typeless node
                    return Ok(());
                };
                if cur == *self.orig() {
                    // self-reference: use the value under evaluation
                    let p = cur.join(self.ctx.at.clone());
                    return self.process(rest, p, Some(t));
                }
                if cur.len() < self.orig().len() {
                    // within the original path: @ is the path component
                    let p = cur.join(self.orig().components()[cur.len()].clone());
                    return self.process(rest, p, Some(t));
                }
                if r.is_value || r.tmpl.is_tag {
                    return Ok(());
                }
                self.leaf_value(rest, cur, r.tmpl.type1, r.tmpl.is_multi)
            }
            "." => self.process(rest, cur, None),
            ".." => {
                if resolved.is_none() || cur.is_root() {
                    return Ok(());
                }
                let mut p = cur;
                p.pop();
                let Some(up) = self.ctx.registry.try_resolve(&p)? else {
                    return Ok(());
                };
                if up.is_tag_value() {
                    // at a tag value, the parent is above the tag node
                    if p.pop().is_none() {
                        return Ok(());
                    }
                }
                self.process(rest, p, None)
            }
            "@@" => {
                let Some(r) = resolved else { return Ok(()) };
                let Some(t) = r.tmpl.type1 else { return Ok(()) };
                if r.is_value {
                    return Ok(());
                }
                if r.tmpl.is_tag {
                    for tagval in self.cfg_children(&cur)? {
                        self.process(rest, cur.join(tagval), Some(t))?;
                    }
                    Ok(())
                } else {
                    self.leaf_value(rest, cur, r.tmpl.type1, r.tmpl.is_multi)
                }
            }
            text => {
                let mut p = cur;
                if let Some(r) = resolved {
                    if r.is_tag_node() {
                        // descend through the tag level using the
                        // original path's tag value
                        if p.len() >= self.orig().len() {
                            return Ok(());
                        }
                        let tagval = self.orig().components()[p.len()].clone();
                        p.push(tagval);
                    }
                }
                p.push(text);
                self.process(rest, p, None)
            }
        }
    }

    // records the value of the leaf at `cur` and stops the recursion
    fn leaf_value(
        &mut self,
        _rest: &[String],
        cur: CfgPath,
        vtype: Option<ValueType>,
        is_multi: bool,
    ) -> Result<()> {
        let Some(values) = self.ctx.store.read_values(&cur, self.layer())? else {
            return Ok(());
        };
        if is_multi {
            // joined multi-values are reported as plain text
            let joined = values.join(" ");
            self.paths.push((cur.join(joined), Some(ValueType::Txt)));
        } else {
            let Some(v) = values.first() else {
                return Ok(());
            };
            self.paths.push((cur.join(v.clone()), vtype));
        }
        Ok(())
    }

    fn cfg_children(&self, path: &CfgPath) -> Result<Vec<String>> {
        let layer = self.layer();
        let mut out = Vec::new();
        for name in self.ctx.store.children(path, layer, Default::default())? {
            if !self
                .ctx
                .store
                .marked(&path.join(name.clone()), Marker::Deactivated, layer)
            {
                out.push(name);
            }
        }
        Ok(out)
    }

    /// Whether a candidate path exists (as a node, or as a value of its
    /// parent leaf), hiding deactivated subtrees.
    fn path_exists(&self, path: &CfgPath) -> Result<bool> {
        let layer = self.layer();
        if self.ctx.store.deactivated(path, layer) {
            return Ok(false);
        }
        if self.ctx.store.exists(path, layer) {
            return Ok(true);
        }
        let (Some(parent), Some(last)) = (path.parent(), path.last()) else {
            return Ok(false);
        };
        match self.ctx.store.read_values(&parent, layer)? {
            Some(values) => Ok(values.iter().any(|v| v == last)),
            None => Ok(false),
        }
    }

    /// The combined value of the reference: candidate values joined with
    /// single spaces, with the common type, or `None` when nothing
    /// resolved.
    pub fn value(&self) -> Result<Option<(String, ValueType)>> {
        let mut result: Vec<&str> = Vec::new();
        let mut vtype: Option<ValueType> = None;
        for (path, t) in &self.paths {
            let Some(last) = path.last() else { continue };
            if result.contains(&last) {
                continue;
            }
            match t {
                None => {
                    if !self.path_exists(path)? {
                        continue;
                    }
                }
                Some(t) => vtype = Some(*t),
            }
            result.push(last);
        }
        if result.is_empty() {
            return Ok(None);
        }
        let vtype = if result.len() > 1 {
            ValueType::Txt
        } else {
            vtype.unwrap_or(ValueType::Txt)
        };
        Ok(Some((result.join(" "), vtype)))
    }

    /// In set mode the reference must name exactly one destination path.
    pub fn set_path(&self) -> Option<&CfgPath> {
        match &self.paths[..] {
            [(path, _)] => Some(path),
            _ => None,
        }
    }
}
