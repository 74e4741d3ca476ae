//! Evaluation of action-program syntax trees.

use anyhow::{bail, Result};
use regex::Regex;

use cfgtree_schema::{types, ActionNode, CondOp, ValueType};
use cfgtree_store::Layer;

use crate::{context::EvalContext, expand::expand_command, varref::VarRef};

/// A value produced by an operand during evaluation.
#[derive(Debug, Clone)]
struct Value {
    vtype: ValueType,
    values: Vec<String>,
}

/// Evaluates an action program. `Ok(false)` is a check failure (with any
/// diagnostics recorded on the context); `Err` is an internal error.
pub fn execute(ctx: &EvalContext, node: &ActionNode) -> Result<bool> {
    match node {
        ActionNode::List(nodes) => {
            for n in nodes {
                if !execute(ctx, n)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ActionNode::Or(l, r) => Ok(execute(ctx, l)? || execute(ctx, r)?),
        ActionNode::And(l, r) => Ok(execute(ctx, l)? && execute(ctx, r)?),
        ActionNode::Not(inner) => Ok(!execute(ctx, inner)?),
        ActionNode::Cond { op, left, right } => check_cond(ctx, *op, left, right),
        ActionNode::Pattern { operand, pattern } => {
            let re = Regex::new(pattern)
                .map_err(|e| anyhow::anyhow!("cannot compile pattern |{pattern}|: {e}"))?;
            let Some(val) = eval_operand(ctx, operand)? else {
                return Ok(false);
            };
            Ok(val.values.iter().all(|v| re.is_match(v)))
        }
        ActionNode::Exec { command } => {
            if ctx.exec_mode {
                let expanded = expand_command(ctx, command, &ctx.at)?;
                return Ok(ctx.runner().run(&expanded)? == 0);
            }
            // set-time validation runs the command once per value line
            for v in &ctx.at_values {
                let expanded = expand_command(ctx, command, v)?;
                if ctx.runner().run(&expanded)? != 0 {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ActionNode::Help { inner, message } => {
            let ret = execute(ctx, inner)?;
            if !ret {
                ctx.message(expand_command(ctx, message, &ctx.at)?);
            }
            Ok(ret)
        }
        ActionNode::Assign { reference, value } => {
            if !ctx.exec_mode {
                return Ok(true);
            }
            let Some(val) = eval_operand(ctx, value)? else {
                return Ok(false);
            };
            let [single] = &val.values[..] else {
                // only single values can be assigned
                return Ok(false);
            };
            assign_var(ctx, reference, single)?;
            Ok(true)
        }
        ActionNode::Val(_) | ActionNode::Var(_) => {
            bail!("value operand at program top level")
        }
    }
}

fn check_cond(
    ctx: &EvalContext,
    op: CondOp,
    left: &ActionNode,
    right: &ActionNode,
) -> Result<bool> {
    let (Some(l), Some(r)) = (eval_operand(ctx, left)?, eval_operand(ctx, right)?) else {
        return Ok(false);
    };
    if l.vtype != r.vtype {
        ctx.message("Different types in comparison");
        return Ok(false);
    }
    // every left value must satisfy the comparison; for `in` against any
    // right value, otherwise against all of them
    for lv in &l.values {
        let mut ok = op != CondOp::In;
        for rv in &r.values {
            let matched = compare(l.vtype, lv, rv, op);
            if op == CondOp::In {
                if matched {
                    ok = true;
                    break;
                }
            } else if !matched {
                return Ok(false);
            }
        }
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare(vtype: ValueType, left: &str, right: &str, op: CondOp) -> bool {
    let ord = match (
        types::numeric_parts(vtype, left),
        types::numeric_parts(vtype, right),
    ) {
        (Some(l), Some(r)) => l.cmp(&r),
        _ => left.as_bytes().cmp(right.as_bytes()),
    };
    match op {
        CondOp::Eq | CondOp::In => ord.is_eq(),
        CondOp::Ne => ord.is_ne(),
        CondOp::Lt => ord.is_lt(),
        CondOp::Le => ord.is_le(),
        CondOp::Gt => ord.is_gt(),
        CondOp::Ge => ord.is_ge(),
    }
}

fn eval_operand(ctx: &EvalContext, node: &ActionNode) -> Result<Option<Value>> {
    match node {
        ActionNode::Val(lit) => Ok(Some(Value {
            vtype: lit.vtype,
            values: lit.values.clone(),
        })),
        ActionNode::Var(reference) => {
            if reference.starts_with('@') && !reference.starts_with("@@") {
                // the value under evaluation, typed by the template
                return Ok(Some(Value {
                    vtype: ctx.value_type(),
                    values: ctx.at_values.clone(),
                }));
            }
            let vr = VarRef::resolve(ctx, reference, ctx.ref_active())?;
            Ok(vr.value()?.map(|(value, vtype)| Value {
                vtype,
                values: vec![value],
            }))
        }
        _ => bail!("operand is not a value or variable"),
    }
}

/// Performs a `$VAR(...) = value` assignment: the reference must resolve
/// to a single single-valued leaf, which is written in both the working
/// and the active view so the running commit observes it.
fn assign_var(ctx: &EvalContext, reference: &str, value: &str) -> Result<()> {
    let vr = VarRef::resolve(ctx, reference, ctx.ref_active())?;
    let Some(path) = vr.set_path() else {
        return Ok(());
    };
    // strip a trailing `@` style value position to the node itself
    let Some(r) = ctx.registry.try_resolve(path)? else {
        return Ok(());
    };
    let node_path = if r.is_value {
        path.parent().unwrap_or_default()
    } else {
        path.clone()
    };
    let Some(nr) = ctx.registry.try_resolve(&node_path)? else {
        return Ok(());
    };
    if nr.tmpl.is_tag || nr.tmpl.is_multi || nr.tmpl.is_typeless() {
        // only single-value leaf nodes can be assigned
        return Ok(());
    }
    let values = vec![value.to_owned()];
    ctx.store.add_node(&node_path)?;
    ctx.store.write_values(&node_path, &values)?;
    if ctx.store.exists(&node_path, Layer::Active) {
        // keep the active view in step during commit
        let vfile = node_path
            .storage_path(ctx.store.active_root())
            .join(cfgtree_store::layout::VAL_FILE);
        std::fs::write(vfile, format!("{value}\n"))?;
    }
    Ok(())
}
