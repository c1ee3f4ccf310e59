//! Multi-step deployment sequencing.
//!
//! A [`DeploymentPlan`] is an ordered list of contract-creation steps
//! where later steps may take earlier steps' deployed addresses as
//! constructor arguments. The plan tracks which addresses have landed and
//! encodes a step's payload only once every dependency is resolved, so a
//! wallet is never handed bytecode with placeholder arguments.
//!
//! Payload encoding is ABI-style: creation bytecode followed by each
//! constructor argument left-padded to a 32-byte word.

use crate::error::PlanError;

/// One constructor argument slot for a plan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorArg {
    /// A literal address, known at plan creation.
    Address(String),
    /// The address produced by an earlier step, resolved at confirmation.
    AddressOf(usize),
    /// An unsigned integer value.
    Uint(u128),
}

/// One contract-creation step in a plan.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub title: String,
    pub description: String,
    /// Discriminator carried into the session member, e.g. "deploy-token".
    pub kind: String,
    /// Creation bytecode, 0x-prefixed hex.
    pub bytecode: String,
    /// Transfer amount in wei, decimal string.
    pub value: String,
    pub args: Vec<ConstructorArg>,
}

impl PlanStep {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: impl Into<String>,
        bytecode: impl Into<String>,
        args: Vec<ConstructorArg>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            kind: kind.into(),
            bytecode: bytecode.into(),
            value: "0".to_string(),
            args,
        }
    }
}

/// State machine over an ordered deployment sequence.
///
/// Dependencies only point backwards, so confirming steps in order always
/// makes progress. A single failed step poisons the whole plan: with a
/// dependency missing, every downstream payload would be unbuildable.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    steps: Vec<PlanStep>,
    /// Deployed address per step, filled in as confirmations land.
    deployed: Vec<Option<String>>,
    failed: Option<usize>,
}

impl DeploymentPlan {
    /// Validate and build a plan.
    ///
    /// Rejects empty plans, steps whose bytecode is not 0x-prefixed hex,
    /// and `AddressOf` references that point at the step itself or a
    /// later step.
    pub fn new(steps: Vec<PlanStep>) -> Result<Self, PlanError> {
        if steps.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        for (i, step) in steps.iter().enumerate() {
            check_bytecode(i, &step.bytecode)?;
            for arg in &step.args {
                match arg {
                    ConstructorArg::AddressOf(dep) if *dep >= i => {
                        return Err(PlanError::ForwardDependency {
                            step: i,
                            depends_on: *dep,
                        });
                    }
                    ConstructorArg::Address(addr) => {
                        check_address(i, addr)?;
                    }
                    _ => {}
                }
            }
        }
        let deployed = vec![None; steps.len()];
        Ok(Self {
            steps,
            deployed,
            failed: None,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn is_poisoned(&self) -> bool {
        self.failed.is_some()
    }

    /// Address produced by `step`, if it has been confirmed.
    pub fn address_of(&self, step: usize) -> Option<&str> {
        self.deployed.get(step).and_then(|a| a.as_deref())
    }

    /// True when every `AddressOf` dependency of `step` has an address.
    pub fn is_ready(&self, step: usize) -> Result<bool, PlanError> {
        let plan_step = self.step(step)?;
        if self.failed.is_some() {
            return Ok(false);
        }
        Ok(plan_step.args.iter().all(|arg| match arg {
            ConstructorArg::AddressOf(dep) => self.deployed[*dep].is_some(),
            _ => true,
        }))
    }

    /// Record the address a confirmed step deployed at.
    pub fn record_confirmed(
        &mut self,
        step: usize,
        address: impl Into<String>,
    ) -> Result<(), PlanError> {
        self.step(step)?;
        if let Some(failed) = self.failed {
            return Err(PlanError::StepFailed { step: failed });
        }
        let address = address.into();
        check_address(step, &address)?;
        self.deployed[step] = Some(address);
        Ok(())
    }

    /// Poison the plan after a step failed verification.
    pub fn record_failed(&mut self, step: usize) -> Result<(), PlanError> {
        self.step(step)?;
        if self.failed.is_none() {
            self.failed = Some(step);
        }
        Ok(())
    }

    /// Encode the signing payload for `step`: bytecode followed by each
    /// constructor argument as a 32-byte word.
    ///
    /// Fails with [`PlanError::DependencyUnresolved`] if any `AddressOf`
    /// dependency has not produced an address yet.
    pub fn prepare(&self, step: usize) -> Result<String, PlanError> {
        let plan_step = self.step(step)?;
        if let Some(failed) = self.failed {
            return Err(PlanError::StepFailed { step: failed });
        }

        let mut payload = plan_step.bytecode.clone();
        for arg in &plan_step.args {
            let word = match arg {
                ConstructorArg::Address(addr) => encode_address_word(step, addr)?,
                ConstructorArg::AddressOf(dep) => {
                    let addr = self.deployed[*dep].as_deref().ok_or(
                        PlanError::DependencyUnresolved {
                            step,
                            depends_on: *dep,
                        },
                    )?;
                    encode_address_word(step, addr)?
                }
                ConstructorArg::Uint(n) => encode_uint_word(*n),
            };
            payload.push_str(&word);
        }
        Ok(payload)
    }

    fn step(&self, index: usize) -> Result<&PlanStep, PlanError> {
        self.steps.get(index).ok_or(PlanError::OutOfRange {
            step: index,
            len: self.steps.len(),
        })
    }
}

fn check_bytecode(step: usize, bytecode: &str) -> Result<(), PlanError> {
    let Some(hex_part) = bytecode.strip_prefix("0x") else {
        return Err(PlanError::InvalidBytecode {
            step,
            reason: "missing 0x prefix".to_string(),
        });
    };
    if hex_part.is_empty() {
        return Err(PlanError::InvalidBytecode {
            step,
            reason: "empty bytecode".to_string(),
        });
    }
    hex::decode(hex_part).map_err(|e| PlanError::InvalidBytecode {
        step,
        reason: e.to_string(),
    })?;
    Ok(())
}

fn check_address(step: usize, address: &str) -> Result<(), PlanError> {
    let valid = address
        .strip_prefix("0x")
        .is_some_and(|h| h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(PlanError::InvalidAddress {
            step,
            address: address.to_string(),
        })
    }
}

/// Encode an address as a left-padded 32-byte word (no 0x prefix).
fn encode_address_word(step: usize, address: &str) -> Result<String, PlanError> {
    check_address(step, address)?;
    let hex_part = address.trim_start_matches("0x").to_ascii_lowercase();
    Ok(format!("{:0>64}", hex_part))
}

/// Encode an unsigned integer as a left-padded 32-byte word (no 0x prefix).
fn encode_uint_word(n: u128) -> String {
    format!("{:0>64}", format!("{n:x}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOKEN_ADDR: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const FACTORY_ADDR: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn token_factory_router() -> DeploymentPlan {
        DeploymentPlan::new(vec![
            PlanStep::new("Token", "ERC-20", "deploy-token", "0x600160", vec![]),
            PlanStep::new(
                "Factory",
                "pair factory",
                "deploy-factory",
                "0x600260",
                vec![ConstructorArg::AddressOf(0)],
            ),
            PlanStep::new(
                "Router",
                "swap router",
                "deploy-router",
                "0x600360",
                vec![
                    ConstructorArg::AddressOf(1),
                    ConstructorArg::AddressOf(0),
                    ConstructorArg::Uint(500),
                ],
            ),
        ])
        .expect("valid plan")
    }

    #[test]
    fn first_step_is_ready_immediately() {
        let plan = token_factory_router();
        assert!(plan.is_ready(0).unwrap());
        assert!(!plan.is_ready(1).unwrap());
        assert!(!plan.is_ready(2).unwrap());
    }

    #[test]
    fn addresses_thread_through_dependent_payloads() {
        let mut plan = token_factory_router();

        // Step 0 has no args, so its payload is bare bytecode.
        assert_eq!(plan.prepare(0).unwrap(), "0x600160");

        plan.record_confirmed(0, TOKEN_ADDR).unwrap();
        assert!(plan.is_ready(1).unwrap());
        let factory_payload = plan.prepare(1).unwrap();
        assert_eq!(
            factory_payload,
            format!("0x600260{:0>64}", &TOKEN_ADDR[2..]),
        );

        // Router still blocked on the factory address.
        let err = plan.prepare(2).unwrap_err();
        assert!(matches!(
            err,
            PlanError::DependencyUnresolved { step: 2, depends_on: 1 }
        ));

        plan.record_confirmed(1, FACTORY_ADDR).unwrap();
        let router_payload = plan.prepare(2).unwrap();
        assert_eq!(
            router_payload,
            format!(
                "0x600360{:0>64}{:0>64}{:0>64}",
                &FACTORY_ADDR[2..],
                &TOKEN_ADDR[2..],
                "1f4",
            ),
        );
    }

    #[test]
    fn failed_step_poisons_the_plan() {
        let mut plan = token_factory_router();
        plan.record_confirmed(0, TOKEN_ADDR).unwrap();
        plan.record_failed(1).unwrap();

        assert!(plan.is_poisoned());
        assert!(!plan.is_ready(2).unwrap());
        assert!(matches!(
            plan.prepare(2).unwrap_err(),
            PlanError::StepFailed { step: 1 }
        ));
        assert!(matches!(
            plan.record_confirmed(2, FACTORY_ADDR).unwrap_err(),
            PlanError::StepFailed { step: 1 }
        ));
    }

    #[test]
    fn rejects_forward_and_self_dependencies() {
        let forward = DeploymentPlan::new(vec![
            PlanStep::new(
                "A",
                "",
                "deploy-a",
                "0x60",
                vec![ConstructorArg::AddressOf(1)],
            ),
            PlanStep::new("B", "", "deploy-b", "0x60", vec![]),
        ]);
        assert!(matches!(
            forward.unwrap_err(),
            PlanError::ForwardDependency { step: 0, depends_on: 1 }
        ));

        let self_dep = DeploymentPlan::new(vec![PlanStep::new(
            "A",
            "",
            "deploy-a",
            "0x60",
            vec![ConstructorArg::AddressOf(0)],
        )]);
        assert!(matches!(
            self_dep.unwrap_err(),
            PlanError::ForwardDependency { step: 0, depends_on: 0 }
        ));
    }

    #[test]
    fn rejects_empty_plans_and_bad_bytecode() {
        assert!(matches!(
            DeploymentPlan::new(vec![]).unwrap_err(),
            PlanError::EmptyPlan
        ));

        let bad = DeploymentPlan::new(vec![PlanStep::new("A", "", "deploy-a", "6001", vec![])]);
        assert!(matches!(
            bad.unwrap_err(),
            PlanError::InvalidBytecode { step: 0, .. }
        ));

        let odd = DeploymentPlan::new(vec![PlanStep::new("A", "", "deploy-a", "0x601", vec![])]);
        assert!(matches!(
            odd.unwrap_err(),
            PlanError::InvalidBytecode { step: 0, .. }
        ));
    }

    #[test]
    fn rejects_malformed_addresses() {
        let plan = DeploymentPlan::new(vec![PlanStep::new(
            "A",
            "",
            "deploy-a",
            "0x60",
            vec![ConstructorArg::Address("0x1234".to_string())],
        )]);
        assert!(matches!(
            plan.unwrap_err(),
            PlanError::InvalidAddress { step: 0, .. }
        ));

        let mut plan = token_factory_router();
        assert!(matches!(
            plan.record_confirmed(0, "not-an-address").unwrap_err(),
            PlanError::InvalidAddress { step: 0, .. }
        ));
    }

    #[test]
    fn uint_words_are_left_padded_hex() {
        assert_eq!(encode_uint_word(0), "0".repeat(64));
        assert_eq!(
            encode_uint_word(255),
            format!("{:0>64}", "ff"),
        );
    }
}
