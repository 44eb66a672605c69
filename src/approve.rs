use anyhow::Context;
use dialoguer::{Input, Select};

use trellis_agent::interrupt::ApprovalItem;
use trellis_agent::{InterruptRequest, InterruptResponse};

/// How a turn's approval requests get answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    Interactive,
    AcceptAll,
    RejectAll,
}

impl ApprovalMode {
    /// Answers for every item. Interactive prompts run on a blocking thread.
    pub async fn answer(self, request: &InterruptRequest) -> anyhow::Result<Vec<InterruptResponse>> {
        let n = request.items.len();
        match self {
            Self::AcceptAll => Ok(vec![InterruptResponse::Accept; n]),
            Self::RejectAll => Ok(vec![InterruptResponse::Reject; n]),
            Self::Interactive => {
                let items = request.items.clone();
                tokio::task::spawn_blocking(move || {
                    items.iter().map(ask).collect::<anyhow::Result<Vec<_>>>()
                })
                .await
                .context("approval prompt panicked")?
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Choice {
    Accept,
    Reject,
    Edit,
}

fn ask(item: &ApprovalItem) -> anyhow::Result<InterruptResponse> {
    eprintln!("\n[APPROVAL] {}", item.description);
    eprintln!("{}", serde_json::to_string_pretty(&item.call.args)?);

    let mut choices = Vec::new();
    if item.policy.accept {
        choices.push(("승인 (accept)", Choice::Accept));
    }
    if item.policy.reject {
        choices.push(("거절 (reject)", Choice::Reject));
    }
    if item.policy.edit {
        choices.push(("수정 (edit)", Choice::Edit));
    }
    if choices.is_empty() {
        anyhow::bail!("no response kind is allowed for call {}", item.call.id);
    }

    let labels: Vec<&str> = choices.iter().map(|(label, _)| *label).collect();
    let picked = Select::new()
        .with_prompt("How should this call proceed?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(match choices[picked].1 {
        Choice::Accept => InterruptResponse::Accept,
        Choice::Reject => InterruptResponse::Reject,
        Choice::Edit => InterruptResponse::Edit {
            args: edit_args(&item.call.args)?,
        },
    })
}

fn edit_args(current: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let initial = serde_json::to_string(current)?;
    loop {
        let text: String = Input::new()
            .with_prompt("New arguments (JSON)")
            .with_initial_text(initial.clone())
            .interact_text()?;
        match serde_json::from_str(&text) {
            Ok(args) => return Ok(args),
            Err(e) => eprintln!("Invalid JSON: {}", e),
        }
    }
}
