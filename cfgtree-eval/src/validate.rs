//! Set-time value validation.

use anyhow::Result;

use cfgtree_schema::{validate_type, ActionKind};

use crate::{context::EvalContext, syntax};

const DISALLOWED: &[(char, &str)] = &[
    ('\'', "single quote (')"),
    ('\n', "newline"),
    ('"', "double quote (\")"),
];

/// Validates the context's value against the node's type(s) and syntax
/// program. `Ok(false)` is a validation failure with diagnostics
/// recorded on the context.
pub fn validate_value(ctx: &EvalContext) -> Result<bool> {
    for (c, name) in DISALLOWED {
        if ctx.at.contains(*c) {
            ctx.message(format!("Cannot use the {name} character in a value string"));
            return Ok(false);
        }
    }

    if let Some(t1) = ctx.tmpl.type1 {
        for v in &ctx.at_values {
            let ok = validate_type(t1, v)
                || ctx.tmpl.type2.map(|t2| validate_type(t2, v)).unwrap_or(false);
            if !ok {
                match &ctx.tmpl.type_help {
                    Some(help) => {
                        ctx.message(crate::expand::expand_command(ctx, help, &ctx.at)?)
                    }
                    None => {
                        let tname = match ctx.tmpl.type2 {
                            Some(t2) => format!("{t1} or {t2}"),
                            None => t1.to_string(),
                        };
                        ctx.message(format!("\"{v}\" is not a valid value of type \"{tname}\""));
                    }
                }
                return Ok(false);
            }
        }
    }

    match ctx.tmpl.action(ActionKind::Syntax) {
        Some(program) => syntax::execute(ctx, program),
        None => Ok(true),
    }
}
