// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Axis selector values: a literal comma list (`1,5,151`, aliases
//! allowed), `all` (present axes) or `alive`.

use anyhow::Result;
use steprack_client::Controller;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelector {
    All,
    Alive,
    List(Vec<String>),
}

impl AxisSelector {
    pub fn parse(value: &str) -> Result<AxisSelector> {
        let value = value.trim();
        match value.to_lowercase().as_str() {
            "all" => Ok(AxisSelector::All),
            "alive" => Ok(AxisSelector::Alive),
            _ => {
                let items: Vec<String> = value
                    .split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect();
                if items.is_empty() {
                    anyhow::bail!("empty axis selector");
                }
                Ok(AxisSelector::List(items))
            }
        }
    }

    /// Resolve to concrete addresses against a controller.
    pub fn resolve(&self, ctrl: &Controller) -> Result<Vec<u16>> {
        Ok(match self {
            AxisSelector::All => ctrl.find_axes(false)?,
            AxisSelector::Alive => ctrl.find_axes(true)?,
            AxisSelector::List(items) => items
                .iter()
                .map(|item| ctrl.resolve(item))
                .collect::<Result<_, _>>()?,
        })
    }
}
