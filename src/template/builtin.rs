use super::{ParameterType, Template, TemplateParameter};

/// Every built-in template.
pub fn templates() -> Vec<Template> {
    vec![mutual_credit_agreement(), proposal_policy(), resource_allocation()]
}

/// Bilateral mutual credit line between two cooperatives.
///
/// The initialization block opens the credit line through the `economic`
/// namespace and evaluates to the line returned by the ledger.
pub fn mutual_credit_agreement() -> Template {
    Template {
        name: "MutualCreditAgreement".to_string(),
        description: "Mutual credit line between two cooperatives".to_string(),
        parameters: vec![
            TemplateParameter::required("coop1_did", ParameterType::Address)
                .describe("First cooperative"),
            TemplateParameter::required("coop2_did", ParameterType::Address)
                .describe("Second cooperative"),
            TemplateParameter::required("credit_limit", ParameterType::Integer)
                .describe("Maximum outstanding balance in either direction"),
            TemplateParameter::optional("duration_days", ParameterType::Integer, Some(365.into()))
                .describe("Days until the agreement is reviewed"),
        ],
        script_template: r#"// Mutual credit agreement
let agreement = {
    parties: [{{coop1_did}}, {{coop2_did}}],
    credit_limit: {{credit_limit}},
    duration_days: {{duration_days}}
}

{
    let line = economic.create_mutual_credit_line({{coop1_did}}, {{coop2_did}}, {{credit_limit}})
    print("credit line opened for", agreement.duration_days, "days")
    line
}
"#
        .to_string(),
        documentation: Some(
            "Requires the permission guarding economic.create_mutual_credit_line.".to_string(),
        ),
        tags: vec!["economic".to_string(), "mutual-credit".to_string()],
    }
}

/// Quorum and approval rules for a class of proposals.
///
/// Expects a `votes` binding of the form `{yes, no, abstain, eligible}` and
/// evaluates to `{proposal_type, quorum_met, approved}`.
pub fn proposal_policy() -> Template {
    Template {
        name: "ProposalPolicy".to_string(),
        description: "Quorum and supermajority rules for proposals".to_string(),
        parameters: vec![
            TemplateParameter::required("proposal_type", ParameterType::String),
            TemplateParameter::optional("quorum_percent", ParameterType::Integer, Some(50.into())),
            TemplateParameter::optional("approval_percent", ParameterType::Integer, Some(66.into())),
        ],
        script_template: r#"// Proposal policy
let policy = {
    proposal_type: {{proposal_type}},
    quorum_percent: {{quorum_percent}},
    approval_percent: {{approval_percent}}
}

{
    let cast = votes.yes + votes.no + votes.abstain
    let quorum_met = cast * 100 >= votes.eligible * policy.quorum_percent
    let decided = votes.yes + votes.no
    let approved = quorum_met && decided > 0 && votes.yes * 100 >= decided * policy.approval_percent
    { proposal_type: policy.proposal_type, quorum_met: quorum_met, approved: approved }
}
"#
        .to_string(),
        documentation: None,
        tags: vec!["governance".to_string()],
    }
}

/// Allocation of pooled resources to a member, bounded by pool capacity.
pub fn resource_allocation() -> Template {
    Template {
        name: "ResourceAllocation".to_string(),
        description: "Allocate pooled resources to a member".to_string(),
        parameters: vec![
            TemplateParameter::required(
                "resource_type",
                ParameterType::Select(vec![
                    "compute".to_string(),
                    "storage".to_string(),
                    "bandwidth".to_string(),
                ]),
            ),
            TemplateParameter::required("amount", ParameterType::Integer),
            TemplateParameter::required("pool_did", ParameterType::Address),
            TemplateParameter::required("recipient_did", ParameterType::Address),
        ],
        script_template: r#"// Resource allocation
let request = { resource: {{resource_type}}, amount: {{amount}}, recipient: {{recipient_did}} }

{
    let available = economic.get_balance({{pool_did}}, request.resource)
    if request.amount <= 0 || available < request.amount {
        { allocated: false, requested: request.amount, available: available }
    } else {
        economic.transfer({{pool_did}}, request.recipient, request.resource, request.amount)
        { allocated: true, requested: request.amount, available: available - request.amount }
    }
}
"#
        .to_string(),
        documentation: None,
        tags: vec!["economic".to_string(), "resources".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_valid() {
        for template in templates() {
            template.validate().unwrap();
        }
    }
}
