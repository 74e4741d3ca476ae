//! Parsing of `node.def` template files.
//!
//! A `node.def` is a sequence of `field: value` lines. Action fields
//! (`begin:`, `create:`, ...) and expression fields
//! (`syntax:expression:`, `commit:expression:`) may continue over
//! following lines until the next field starts. Expression fields carry
//! the template expression language:
//!
//! ```text
//! syntax:expression: $VAR(@) in "low", "high" ; "bad level"
//! syntax:expression: pattern $VAR(@) "^[a-z]+$"
//! syntax:expression: exec "/usr/libexec/check-name $VAR(@)"
//! commit:expression: $VAR(../mtu/@) <= 9000
//! ```
//!
//! Operators: `&&`, `||`, `!`, parentheses, comparisons
//! (`== != < <= > >= in`), `pattern`, `exec`, assignment
//! (`$VAR(...) = value`), and a trailing `; "message"` attaching an error
//! message.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::multispace0,
    combinator::{map, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::{ActionKind, ActionNode, Actions, CondOp, Template, ValLiteral, ValueType};

/// Template file parse failure.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unknown field \"{field}\"")]
    UnknownField { line: usize, field: String },
    #[error("line {line}: invalid {field} value \"{value}\"")]
    InvalidValue {
        line: usize,
        field: String,
        value: String,
    },
    #[error("syntax error in expression \"{0}\"")]
    Expression(String),
    #[error("line {line}: unexpected continuation")]
    UnexpectedContinuation { line: usize },
}

/// Parses the full text of a `node.def` file into a [`Template`].
pub fn parse_node_def(text: &str) -> Result<Template, ParseError> {
    let mut tmpl = Template::default();
    let mut actions = Actions::default();
    // (field, kind, collected text, line) of an action field still open
    // for continuation lines
    let mut open: Option<(ActionField, String)> = None;

    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if line.trim_start().starts_with('#') {
            continue;
        }
        if let Some((field, value)) = split_field(line) {
            flush_action(&mut actions, &mut open)?;
            match field {
                "tag" | "multi" => {
                    let limit = if value.is_empty() {
                        0
                    } else {
                        value
                            .parse::<u32>()
                            .map_err(|_| ParseError::InvalidValue {
                                line: lineno,
                                field: field.to_owned(),
                                value: value.to_owned(),
                            })?
                    };
                    if field == "tag" {
                        tmpl.is_tag = true;
                        tmpl.tag_limit = limit;
                    } else {
                        tmpl.is_multi = true;
                        tmpl.multi_limit = limit;
                    }
                }
                "type" => {
                    let mut types = value.split(',').map(str::trim);
                    let t1 = types.next().unwrap_or_default();
                    tmpl.type1 =
                        Some(
                            ValueType::from_name(t1).ok_or_else(|| ParseError::InvalidValue {
                                line: lineno,
                                field: "type".to_owned(),
                                value: t1.to_owned(),
                            })?,
                        );
                    if let Some(t2) = types.next() {
                        tmpl.type2 = Some(ValueType::from_name(t2).ok_or_else(|| {
                            ParseError::InvalidValue {
                                line: lineno,
                                field: "type".to_owned(),
                                value: t2.to_owned(),
                            }
                        })?);
                    }
                }
                "default" => tmpl.default_value = Some(unquote(value).to_owned()),
                "priority" => {
                    tmpl.priority =
                        Some(
                            value
                                .parse::<u32>()
                                .map_err(|_| ParseError::InvalidValue {
                                    line: lineno,
                                    field: "priority".to_owned(),
                                    value: value.to_owned(),
                                })?,
                        )
                }
                "help" => tmpl.help = Some(value.to_owned()),
                "val_help" => tmpl.value_help = Some(value.to_owned()),
                "type_help" => tmpl.type_help = Some(value.to_owned()),
                "enumeration" => tmpl.enumeration = Some(value.to_owned()),
                "allowed" => tmpl.allowed = Some(value.to_owned()),
                "order" => match value {
                    "version" => tmpl.version_sorted_children = true,
                    _ => {
                        return Err(ParseError::InvalidValue {
                            line: lineno,
                            field: "order".to_owned(),
                            value: value.to_owned(),
                        })
                    }
                },
                // accepted for template compatibility, not used by the core
                "comp_help" => {}
                "syntax:expression" => {
                    open = Some((ActionField::Expr(ActionKind::Syntax), value.to_owned()))
                }
                "commit:expression" => {
                    open = Some((ActionField::Expr(ActionKind::Commit), value.to_owned()))
                }
                "begin" => open = Some((ActionField::Shell(ActionKind::Begin), value.to_owned())),
                "create" => open = Some((ActionField::Shell(ActionKind::Create), value.to_owned())),
                "activate" => {
                    open = Some((ActionField::Shell(ActionKind::Activate), value.to_owned()))
                }
                "update" => open = Some((ActionField::Shell(ActionKind::Update), value.to_owned())),
                "delete" => open = Some((ActionField::Shell(ActionKind::Delete), value.to_owned())),
                "end" => open = Some((ActionField::Shell(ActionKind::End), value.to_owned())),
                _ => {
                    return Err(ParseError::UnknownField {
                        line: lineno,
                        field: field.to_owned(),
                    })
                }
            }
        } else if let Some((_, text)) = open.as_mut() {
            text.push('\n');
            text.push_str(line);
        } else if !line.trim().is_empty() {
            return Err(ParseError::UnexpectedContinuation { line: lineno });
        }
    }
    flush_action(&mut actions, &mut open)?;
    tmpl.actions = actions;
    Ok(tmpl)
}

#[derive(Clone, Copy)]
enum ActionField {
    Expr(ActionKind),
    Shell(ActionKind),
}

fn flush_action(
    actions: &mut Actions,
    open: &mut Option<(ActionField, String)>,
) -> Result<(), ParseError> {
    let Some((field, text)) = open.take() else {
        return Ok(());
    };
    let text = text.trim();
    if text.is_empty() {
        return Ok(());
    }
    match field {
        ActionField::Expr(kind) => actions.append(kind, parse_expression(text)?),
        ActionField::Shell(kind) => actions.append(
            kind,
            ActionNode::Exec {
                command: text.to_owned(),
            },
        ),
    }
    Ok(())
}

const KNOWN_FIELDS: &[&str] = &[
    "tag",
    "multi",
    "type",
    "default",
    "priority",
    "help",
    "val_help",
    "type_help",
    "comp_help",
    "enumeration",
    "allowed",
    "order",
    "begin",
    "create",
    "activate",
    "update",
    "delete",
    "end",
];

/// Splits a `field: value` line, recognizing the two-part
/// `syntax:expression:` / `commit:expression:` field names. Lines whose
/// leading word is not a known field are continuations, so shell action
/// bodies may freely contain colons.
fn split_field(line: &str) -> Option<(&str, &str)> {
    for prefix in ["syntax:expression:", "commit:expression:"] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some((&prefix[..prefix.len() - 1], rest.trim()));
        }
    }
    let colon = line.find(':')?;
    let field = &line[..colon];
    if !KNOWN_FIELDS.contains(&field) {
        return None;
    }
    Some((field, line[colon + 1..].trim()))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Parses a template expression into its syntax tree.
pub fn parse_expression(input: &str) -> Result<ActionNode, ParseError> {
    match expr(input.trim()) {
        Ok(("", node)) => Ok(node),
        _ => Err(ParseError::Expression(input.to_owned())),
    }
}

fn expr(input: &str) -> IResult<&str, ActionNode> {
    let (input, inner) = or_expr(input)?;
    let (input, help) = opt(preceded(
        tuple((multispace0, tag(";"), multispace0)),
        quoted,
    ))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((
        input,
        match help {
            Some(message) => ActionNode::Help {
                inner: Box::new(inner),
                message: message.to_owned(),
            },
            None => inner,
        },
    ))
}

fn or_expr(input: &str) -> IResult<&str, ActionNode> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(
        tuple((multispace0, tag("||"), multispace0)),
        and_expr,
    ))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |acc, n| {
            ActionNode::Or(Box::new(acc), Box::new(n))
        }),
    ))
}

fn and_expr(input: &str) -> IResult<&str, ActionNode> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(
        tuple((multispace0, tag("&&"), multispace0)),
        unary,
    ))(input)?;
    Ok((
        input,
        rest.into_iter().fold(first, |acc, n| {
            ActionNode::And(Box::new(acc), Box::new(n))
        }),
    ))
}

fn unary(input: &str) -> IResult<&str, ActionNode> {
    alt((
        map(
            preceded(pair(tag("!"), multispace0), unary),
            |n| ActionNode::Not(Box::new(n)),
        ),
        atom,
    ))(input)
}

fn atom(input: &str) -> IResult<&str, ActionNode> {
    alt((parens, pattern_expr, exec_expr, op_expr))(input)
}

fn parens(input: &str) -> IResult<&str, ActionNode> {
    delimited(
        pair(tag("("), multispace0),
        expr,
        pair(multispace0, tag(")")),
    )(input)
}

fn pattern_expr(input: &str) -> IResult<&str, ActionNode> {
    let (input, _) = pair(tag("pattern"), multispace0)(input)?;
    let (input, operand) = operand(input)?;
    let (input, _) = multispace0(input)?;
    let (input, pattern) = quoted(input)?;
    Ok((
        input,
        ActionNode::Pattern {
            operand: Box::new(operand),
            pattern: pattern.to_owned(),
        },
    ))
}

fn exec_expr(input: &str) -> IResult<&str, ActionNode> {
    let (input, _) = pair(tag("exec"), multispace0)(input)?;
    let (input, command) = quoted(input)?;
    Ok((
        input,
        ActionNode::Exec {
            command: command.to_owned(),
        },
    ))
}

fn op_expr(input: &str) -> IResult<&str, ActionNode> {
    let (input, left) = operand(input)?;
    let (input, _) = multispace0(input)?;
    if let Ok((input, _)) = pair(tag::<_, _, nom::error::Error<&str>>("in"), multispace0)(input) {
        let (input, values) = value_list(input)?;
        return Ok((
            input,
            ActionNode::Cond {
                op: CondOp::In,
                left: Box::new(left),
                right: Box::new(ActionNode::Val(values)),
            },
        ));
    }
    let (input, op) = cmp_op(input)?;
    let (input, _) = multispace0(input)?;
    let (input, right) = operand(input)?;
    if let Some(op) = op {
        Ok((
            input,
            ActionNode::Cond {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        ))
    } else {
        // plain '=' is assignment; only a variable can be assigned
        let ActionNode::Var(reference) = left else {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            )));
        };
        Ok((
            input,
            ActionNode::Assign {
                reference,
                value: Box::new(right),
            },
        ))
    }
}

// None means plain '=' (assignment)
fn cmp_op(input: &str) -> IResult<&str, Option<CondOp>> {
    alt((
        map(tag("=="), |_| Some(CondOp::Eq)),
        map(tag("!="), |_| Some(CondOp::Ne)),
        map(tag("<="), |_| Some(CondOp::Le)),
        map(tag(">="), |_| Some(CondOp::Ge)),
        map(tag("<"), |_| Some(CondOp::Lt)),
        map(tag(">"), |_| Some(CondOp::Gt)),
        map(tag("="), |_| None),
    ))(input)
}

fn operand(input: &str) -> IResult<&str, ActionNode> {
    alt((
        map(var_ref, |r| ActionNode::Var(r.to_owned())),
        map(alt((quoted, bare)), |v| {
            ActionNode::Val(ValLiteral::single(v))
        }),
    ))(input)
}

fn value_list(input: &str) -> IResult<&str, ValLiteral> {
    let (input, values) = separated_list1(
        tuple((multispace0, tag(","), multispace0)),
        alt((quoted, bare)),
    )(input)?;
    let values: Vec<String> = values.into_iter().map(str::to_owned).collect();
    let first = ValueType::detect(&values[0]);
    let vtype = if values.iter().all(|v| ValueType::detect(v) == first) {
        first
    } else {
        ValueType::Txt
    };
    Ok((input, ValLiteral { values, vtype }))
}

fn var_ref(input: &str) -> IResult<&str, &str> {
    delimited(tag("$VAR("), take_until(")"), tag(")"))(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(tag("\""), take_until("\""), tag("\""))(input)
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| {
        !c.is_whitespace() && !matches!(c, ';' | ',' | '(' | ')' | '&' | '|' | '!' | '=' | '<' | '>')
    })(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_leaf() {
        let t = parse_node_def("type: txt\nhelp: Host name\ndefault: \"router\"\n").unwrap();
        assert_eq!(t.type1, Some(ValueType::Txt));
        assert_eq!(t.help.as_deref(), Some("Host name"));
        assert_eq!(t.default_value.as_deref(), Some("router"));
        assert!(!t.is_tag);
        assert!(!t.is_multi);
    }

    #[test]
    fn tag_with_limit_and_priority() {
        let t = parse_node_def("tag: 8\ntype: txt\npriority: 400\n").unwrap();
        assert!(t.is_tag);
        assert_eq!(t.tag_limit, 8);
        assert_eq!(t.priority, Some(400));
    }

    #[test]
    fn two_types() {
        let t = parse_node_def("type: ipv4, ipv6\n").unwrap();
        assert_eq!(t.type1, Some(ValueType::Ipv4));
        assert_eq!(t.type2, Some(ValueType::Ipv6));
    }

    #[test]
    fn multi_with_limit() {
        let t = parse_node_def("multi: 4\ntype: ipv4net\n").unwrap();
        assert!(t.is_multi);
        assert_eq!(t.multi_limit, 4);
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(matches!(
            parse_node_def("bogus: 1\n"),
            Err(ParseError::UnexpectedContinuation { line: 1 })
        ));
    }

    #[test]
    fn shell_body_may_contain_colons() {
        let t = parse_node_def("create: logger -t cfg: created $VAR(@)\n").unwrap();
        assert!(matches!(t.actions.create, Some(ActionNode::Exec { .. })));
    }

    #[test]
    fn shell_action_with_continuation() {
        let t = parse_node_def("type: txt\ncreate: /sbin/ip link add $VAR(@)\n    || exit 1\n")
            .unwrap();
        let ActionNode::Exec { command } = t.actions.create.as_ref().unwrap() else {
            panic!("expected exec");
        };
        assert!(command.contains("ip link add"));
        assert!(command.contains("|| exit 1"));
    }

    #[test]
    fn expression_help_and_in() {
        let t = parse_node_def(
            "type: txt\nsyntax:expression: $VAR(@) in \"a\", \"b\" ; \"must be a or b\"\n",
        )
        .unwrap();
        let ActionNode::Help { inner, message } = t.actions.syntax.as_ref().unwrap() else {
            panic!("expected help");
        };
        assert_eq!(message, "must be a or b");
        let ActionNode::Cond { op: CondOp::In, right, .. } = inner.as_ref() else {
            panic!("expected in-cond");
        };
        let ActionNode::Val(lit) = right.as_ref() else {
            panic!("expected literal list");
        };
        assert_eq!(lit.values, ["a", "b"]);
    }

    #[test]
    fn expression_operators() {
        let n = parse_expression("$VAR(@) <= 4094 && ! $VAR(@) == 0").unwrap();
        let ActionNode::And(l, r) = n else { panic!("expected and") };
        assert!(matches!(*l, ActionNode::Cond { op: CondOp::Le, .. }));
        assert!(matches!(*r, ActionNode::Not(_)));
    }

    #[test]
    fn expression_pattern_and_exec() {
        let n = parse_expression("pattern $VAR(@) \"^eth[0-9]+$\" || exec \"/bin/check $VAR(@)\"")
            .unwrap();
        let ActionNode::Or(l, r) = n else { panic!("expected or") };
        assert!(matches!(*l, ActionNode::Pattern { .. }));
        assert!(matches!(*r, ActionNode::Exec { .. }));
    }

    #[test]
    fn expression_assignment() {
        let n = parse_expression("$VAR(./enable/@) = \"true\"").unwrap();
        let ActionNode::Assign { reference, .. } = n else {
            panic!("expected assign");
        };
        assert_eq!(reference, "./enable/@");
    }

    #[test]
    fn repeated_expressions_form_list() {
        let t = parse_node_def(
            "type: u32\nsyntax:expression: $VAR(@) >= 1\nsyntax:expression: $VAR(@) <= 10\n",
        )
        .unwrap();
        assert!(matches!(
            t.actions.syntax.as_ref().unwrap(),
            ActionNode::List(l) if l.len() == 2
        ));
    }

    #[test]
    fn literal_typing() {
        let lit = ValLiteral::single("4094");
        assert_eq!(lit.vtype, ValueType::U32);
        let lit = ValLiteral::single("10.0.0.1");
        assert_eq!(lit.vtype, ValueType::Ipv4);
        let lit = ValLiteral::single("hello");
        assert_eq!(lit.vtype, ValueType::Txt);
    }
}
