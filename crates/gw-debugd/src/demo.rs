// demo.rs: A tiny scripted policy and the engine loop that runs it.
//
// Stands in for the gateway's execution engine: it walks an assertion tree,
// numbering lines in document order, and calls the debugger hooks at every
// message and assertion boundary exactly where the real engine does.

use gw_stepdebug::{AssertionInfo, AssertionPath, DebugManager, PolicyId, RequestContext};

pub enum Assertion {
    SetVariable { name: String, value: String },
    /// Succeeds when every child succeeds; stops at the first failure.
    All(Vec<Assertion>),
    /// Succeeds at the first child that succeeds.
    AtLeastOne(Vec<Assertion>),
    /// Always fails.
    Falsify,
}

impl Assertion {
    fn set(name: &str, value: &str) -> Self {
        Assertion::SetVariable {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Assertion::SetVariable { .. } => "Set Context Variable",
            Assertion::All(_) => "All assertions must evaluate to true",
            Assertion::AtLeastOne(_) => "At least one assertion must evaluate to true",
            Assertion::Falsify => "Stop Processing",
        }
    }

    /// Number of lines this assertion occupies, itself included.
    fn lines(&self) -> u32 {
        match self {
            Assertion::All(children) | Assertion::AtLeastOne(children) => {
                1 + children.iter().map(Assertion::lines).sum::<u32>()
            }
            _ => 1,
        }
    }
}

/// The policy printed by `--list`.
pub fn demo_policy() -> Assertion {
    Assertion::All(vec![
        Assertion::set("output", "out0"),
        Assertion::set("greeting", "hello"),
        Assertion::AtLeastOne(vec![
            Assertion::All(vec![Assertion::Falsify, Assertion::set("output", "never")]),
            Assertion::All(vec![
                Assertion::set("output", "out1"),
                Assertion::set("branch", "second"),
            ]),
        ]),
        Assertion::set("done", "done"),
    ])
}

/// Render the policy with line numbers, for choosing breakpoints.
pub fn listing(policy: &Assertion) -> Vec<String> {
    let mut out = Vec::new();
    list_into(policy, 1, 0, &mut out);
    out
}

fn list_into(assertion: &Assertion, line: u32, depth: usize, out: &mut Vec<String>) {
    let detail = match assertion {
        Assertion::SetVariable { name, value } => format!(" ({} = {})", name, value),
        _ => String::new(),
    };
    out.push(format!(
        "{:>3}  {}{}{}",
        line,
        "  ".repeat(depth),
        assertion.display_name(),
        detail
    ));
    if let Assertion::All(children) | Assertion::AtLeastOne(children) = assertion {
        let mut next = line + 1;
        for child in children {
            list_into(child, next, depth + 1, out);
            next += child.lines();
        }
    }
}

/// Process one request against `policy`, calling the debugger hooks.
pub fn process_request(
    manager: &DebugManager,
    policy_id: &PolicyId,
    policy: &Assertion,
    ctx: &mut RequestContext,
) -> bool {
    manager.on_message_arrived(ctx, policy_id);
    let passed = execute(manager, policy, 1, ctx);
    manager.on_message_finished(ctx);
    passed
}

fn execute(manager: &DebugManager, assertion: &Assertion, line: u32, ctx: &mut RequestContext) -> bool {
    let info = AssertionInfo::new(AssertionPath::new(vec![line]), line, assertion.display_name());
    manager.on_start_assertion(&*ctx, &info);

    let passed = match assertion {
        Assertion::SetVariable { name, value } => {
            ctx.set_variable(name.as_str(), value.as_str());
            true
        }
        Assertion::Falsify => false,
        Assertion::All(children) => {
            let mut next = line + 1;
            let mut passed = true;
            for child in children {
                if !execute(manager, child, next, ctx) {
                    passed = false;
                    break;
                }
                next += child.lines();
            }
            passed
        }
        Assertion::AtLeastOne(children) => {
            let mut next = line + 1;
            let mut passed = false;
            for child in children {
                if execute(manager, child, next, ctx) {
                    passed = true;
                    break;
                }
                next += child.lines();
            }
            passed
        }
    };

    manager.on_finish_assertion(&*ctx);
    passed
}
