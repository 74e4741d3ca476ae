//! Expansion of `$VAR(...)` references in external command strings.

use anyhow::Result;

use crate::{context::EvalContext, varref::VarRef};

/// Expands every `$VAR(...)` reference in `command` for execution, with
/// `at` bound to `@`. Unresolvable references expand to the empty string
/// so scripts observe the same contract as unset shell variables.
pub fn expand_command(ctx: &EvalContext, command: &str, at: &str) -> Result<String> {
    const MARKER: &str = "$VAR(";
    let mut out = String::with_capacity(command.len());
    let mut rest = command;
    while let Some(start) = rest.find(MARKER) {
        out.push_str(&rest[..start]);
        let after = &rest[start + MARKER.len()..];
        let Some(end) = after.find(')') else {
            // unterminated reference, keep the text as is
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let reference = &after[..end];
        if reference.starts_with('@') && !reference.starts_with("@@") {
            out.push_str(at);
        } else {
            let vr = VarRef::resolve(ctx, reference, ctx.ref_active())?;
            if let Some((value, _)) = vr.value()? {
                out.push_str(&value);
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
