use crate::logic::SimulationPlan;

pub mod catalog;
pub mod live;
pub mod progression;
pub mod smoke;

// Logic test scenario
#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

/// A named, listable scenario backed by a simulation plan.
#[derive(Debug, Clone)]
pub struct SimulationScenario {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    plan: SimulationPlan,
}

impl SimulationScenario {
    pub fn new(
        key: &'static str,
        name: &'static str,
        description: &'static str,
        plan: SimulationPlan,
    ) -> Self {
        Self {
            key,
            name,
            description,
            plan,
        }
    }

    #[must_use]
    pub fn key(&self) -> &'static str {
        self.key
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        self.description
    }

    #[must_use]
    pub fn plan(&self) -> &SimulationPlan {
        &self.plan
    }

    #[must_use]
    pub fn as_logic_scenario(&self) -> TestScenario {
        TestScenario::simulation(self.name(), self.plan().clone())
    }
}

/// Every registered scenario, in listing order.
pub fn all_scenarios() -> Vec<SimulationScenario> {
    let mut scenarios = vec![smoke::smoke_scenario()];
    scenarios.extend(catalog::catalog_scenarios());
    scenarios.extend(progression::progression_scenarios());
    scenarios.push(live::live_session_scenario());
    scenarios
}

pub fn get_scenario(key: &str) -> Option<SimulationScenario> {
    let key = key.trim().to_lowercase();
    all_scenarios()
        .into_iter()
        .find(|scenario| scenario.key() == key)
}

/// `(key, name, description)` for each scenario.
pub fn list_scenarios() -> Vec<(&'static str, &'static str, &'static str)> {
    all_scenarios()
        .iter()
        .map(|scenario| (scenario.key(), scenario.name(), scenario.description()))
        .collect()
}

pub fn scenario_keys() -> Vec<&'static str> {
    all_scenarios().iter().map(SimulationScenario::key).collect()
}
