// Migration Planner
//
// Decides which scripts are pending relative to a starting level.
// This module is pure: no store access, no side effects.

use crate::script::{Level, MigrationScript, ScriptSet};

/// Scripts eligible for one run, in the order they were supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan<'a> {
    pub from: Level,
    pub target: Option<Level>,
    scripts: Vec<&'a MigrationScript>,
}

impl<'a> MigrationPlan<'a> {
    pub fn build(scripts: &'a ScriptSet, from: Level, target: Option<Level>) -> Self {
        Self {
            from,
            target,
            scripts: pending(scripts, from, target).collect(),
        }
    }

    pub fn scripts(&self) -> &[&'a MigrationScript] {
        &self.scripts
    }

    pub fn levels(&self) -> Vec<Level> {
        self.scripts.iter().map(|script| script.level()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Level the store reaches once the plan is applied: the last eligible
    /// script (also the highest, scripts ascend), or `from` when nothing is
    /// eligible.
    pub fn high_water_mark(&self) -> Level {
        self.scripts
            .last()
            .map_or(self.from, |script| script.level())
    }
}

/// Select scripts with `from < level` and, when a target is given,
/// `level <= target`. Supplied order is preserved, never sorted.
pub fn pending<'a>(
    scripts: &'a ScriptSet,
    from: Level,
    target: Option<Level>,
) -> impl Iterator<Item = &'a MigrationScript> + 'a {
    scripts
        .iter()
        .filter(move |script| is_eligible(script.level(), from, target))
}

fn is_eligible(level: Level, from: Level, target: Option<Level>) -> bool {
    level > from && target.map_or(true, |target| level <= target)
}
