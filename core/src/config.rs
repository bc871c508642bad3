use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every constant the stipend calculator and break proration engine rely on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StipendRules {
    pub incentive: IncentiveRules,
    pub caps: CapRules,
    pub bonuses: BonusRules,
    pub proration: ProrationRules,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncentiveRules {
    /// Minimum total credits that earn any incentive.
    pub credit_threshold: Decimal,
    /// Flat incentive paid at exactly the threshold.
    pub threshold_amount: Decimal,
    /// Additional incentive per credit above the threshold.
    pub per_credit_above: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapRules {
    /// Cap on incentive alone for students with no base stipend.
    pub zero_base_cap: Decimal,
    /// Cap on base + incentive for everyone else.
    pub combined_cap: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BonusRules {
    pub elite_tier_bonus: Decimal,
    pub chabura_1_rate: Decimal,
    pub chabura_2_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProrationRules {
    /// Trailing pay periods used as the earning-rate basis.
    pub history_window: usize,
    /// Month (1-12) in which the school year begins.
    pub school_year_start_month: u32,
}

impl StipendRules {
    /// Load from the data/ directory.
    /// In tests, use StipendRules::default_rules().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/kollel/stipend_rules.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let rules: StipendRules = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        rules.validate()?;
        log::debug!("Loaded stipend rules from {path}");
        Ok(rules)
    }

    /// Hardcoded defaults, identical to the shipped data/kollel/stipend_rules.json.
    pub fn default_rules() -> Self {
        Self {
            incentive: IncentiveRules {
                credit_threshold: Decimal::from(10),
                threshold_amount: Decimal::from(200),
                per_credit_above: Decimal::from(25),
            },
            caps: CapRules {
                zero_base_cap: Decimal::from(500),
                combined_cap: Decimal::from(1000),
            },
            bonuses: BonusRules {
                elite_tier_bonus: Decimal::from(1000),
                chabura_1_rate: Decimal::from(25),
                chabura_2_rate: Decimal::from(50),
            },
            proration: ProrationRules {
                history_window: 5,
                school_year_start_month: 8,
            },
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.proration.history_window == 0 {
            anyhow::bail!("proration.history_window must be at least 1");
        }
        if !(1..=12).contains(&self.proration.school_year_start_month) {
            anyhow::bail!(
                "proration.school_year_start_month must be 1-12, got {}",
                self.proration.school_year_start_month
            );
        }
        let amounts = [
            ("incentive.credit_threshold", self.incentive.credit_threshold),
            ("incentive.threshold_amount", self.incentive.threshold_amount),
            ("incentive.per_credit_above", self.incentive.per_credit_above),
            ("caps.zero_base_cap", self.caps.zero_base_cap),
            ("caps.combined_cap", self.caps.combined_cap),
            ("bonuses.elite_tier_bonus", self.bonuses.elite_tier_bonus),
            ("bonuses.chabura_1_rate", self.bonuses.chabura_1_rate),
            ("bonuses.chabura_2_rate", self.bonuses.chabura_2_rate),
        ];
        for (name, value) in amounts {
            if value < Decimal::ZERO {
                anyhow::bail!("{name} must not be negative, got {value}");
            }
        }
        Ok(())
    }
}
