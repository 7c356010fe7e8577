//! Controller registration table.
//!
//! The registry owns every controller and decides execution order:
//! ascending `level`, then ascending `order`, then registration sequence.

use std::collections::BTreeSet;

use pl_core::{ControllerId, Id};
use pl_net::CellRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::Controller;
use crate::error::{ControlError, ControlResult};

/// Placement of a controller in the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Coarse execution phase; lower levels converge first.
    pub level: i32,
    /// Tie-break inside a level.
    pub order: i32,
    /// Out-of-service controllers are skipped entirely.
    pub in_service: bool,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            level: 0,
            order: 0,
            in_service: true,
        }
    }
}

impl Registration {
    pub fn new(level: i32, order: i32) -> Self {
        Self {
            level,
            order,
            ..Self::default()
        }
    }
}

pub(crate) struct Entry {
    pub(crate) id: ControllerId,
    pub(crate) registration: Registration,
    pub(crate) controller: Box<dyn Controller>,
}

/// Diagnostic row describing one registered controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSummary {
    pub id: u32,
    pub name: String,
    pub level: i32,
    pub order: i32,
    pub in_service: bool,
    pub writes: Vec<String>,
}

/// Ordered collection of registered controllers.
#[derive(Default)]
pub struct ControllerRegistry {
    entries: Vec<Entry>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller at `(level, order)`.
    pub fn add<C: Controller + 'static>(
        &mut self,
        controller: C,
        level: i32,
        order: i32,
    ) -> ControlResult<ControllerId> {
        self.add_boxed(Box::new(controller), Registration::new(level, order))
    }

    /// Register a boxed controller.
    ///
    /// Fails with [`ControlError::WriteConflict`] when an in-service
    /// controller with the same level and order already writes one of the
    /// incoming controller's cells.
    pub fn add_boxed(
        &mut self,
        controller: Box<dyn Controller>,
        registration: Registration,
    ) -> ControlResult<ControllerId> {
        if registration.in_service {
            self.check_conflicts(controller.as_ref(), registration)?;
        }

        let index = u32::try_from(self.entries.len()).map_err(|_| ControlError::InvalidArg {
            what: "too many controllers",
        })?;
        let id = Id::from_index(index);
        debug!(
            controller = controller.name(),
            level = registration.level,
            order = registration.order,
            "registered controller"
        );
        self.entries.push(Entry {
            id,
            registration,
            controller,
        });
        Ok(id)
    }

    fn check_conflicts(
        &self,
        incoming: &dyn Controller,
        registration: Registration,
    ) -> ControlResult<()> {
        let incoming_cells: BTreeSet<CellRef> = incoming.writes().into_iter().collect();
        for entry in self.entries.iter().filter(|e| {
            e.registration.in_service && e.registration.level == registration.level
        }) {
            let overlap = entry
                .controller
                .writes()
                .into_iter()
                .find(|cell| incoming_cells.contains(cell));
            let Some(cell) = overlap else { continue };

            if entry.registration.order == registration.order {
                return Err(ControlError::WriteConflict {
                    cell,
                    existing: entry.controller.name().to_string(),
                    incoming: incoming.name().to_string(),
                });
            }
            debug!(
                %cell,
                existing = entry.controller.name(),
                incoming = incoming.name(),
                "overlapping writes resolved by order"
            );
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Toggle a controller in or out of service.
    ///
    /// Bringing a controller back into service re-runs the conflict check.
    pub fn set_in_service(&mut self, id: ControllerId, in_service: bool) -> ControlResult<()> {
        let pos = self.position(id)?;
        if in_service && !self.entries[pos].registration.in_service {
            let mut registration = self.entries[pos].registration;
            registration.in_service = true;
            let entry = self.entries.remove(pos);
            let result = self.check_conflicts(entry.controller.as_ref(), registration);
            self.entries.insert(pos, entry);
            result?;
        }
        self.entries[pos].registration.in_service = in_service;
        Ok(())
    }

    pub fn controller(&self, id: ControllerId) -> ControlResult<&dyn Controller> {
        let pos = self.position(id)?;
        Ok(self.entries[pos].controller.as_ref())
    }

    pub fn registration(&self, id: ControllerId) -> ControlResult<Registration> {
        let pos = self.position(id)?;
        Ok(self.entries[pos].registration)
    }

    /// Distinct levels of in-service controllers, ascending.
    pub fn levels(&self) -> Vec<i32> {
        let levels: BTreeSet<i32> = self
            .entries
            .iter()
            .filter(|e| e.registration.in_service)
            .map(|e| e.registration.level)
            .collect();
        levels.into_iter().collect()
    }

    /// In-service controller ids in execution order.
    pub fn execution_order(&self) -> Vec<ControllerId> {
        self.sorted_positions(|_| true)
            .into_iter()
            .map(|pos| self.entries[pos].id)
            .collect()
    }

    /// Positions of in-service controllers of one level, by `order` then
    /// registration sequence.
    pub(crate) fn level_members(&self, level: i32) -> Vec<usize> {
        self.sorted_positions(|e| e.registration.level == level)
    }

    pub(crate) fn ordered_positions(&self) -> Vec<usize> {
        self.sorted_positions(|_| true)
    }

    pub(crate) fn entry(&self, pos: usize) -> &Entry {
        &self.entries[pos]
    }

    pub(crate) fn entry_mut(&mut self, pos: usize) -> &mut Entry {
        &mut self.entries[pos]
    }

    fn sorted_positions(&self, keep: impl Fn(&Entry) -> bool) -> Vec<usize> {
        let mut positions: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.registration.in_service && keep(e))
            .map(|(pos, _)| pos)
            .collect();
        // Stable sort keeps registration sequence for equal keys.
        positions.sort_by_key(|&pos| {
            let r = self.entries[pos].registration;
            (r.level, r.order)
        });
        positions
    }

    fn position(&self, id: ControllerId) -> ControlResult<usize> {
        let pos = id.index() as usize;
        match self.entries.get(pos) {
            Some(entry) if entry.id == id => Ok(pos),
            _ => Err(ControlError::UnknownController { id }),
        }
    }

    /// One summary row per registered controller, in execution order
    /// (out-of-service controllers last).
    pub fn diagnostic(&self) -> Vec<ControllerSummary> {
        let mut positions = self.ordered_positions();
        positions.extend(
            self.entries
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.registration.in_service)
                .map(|(pos, _)| pos),
        );
        positions
            .into_iter()
            .map(|pos| {
                let entry = &self.entries[pos];
                ControllerSummary {
                    id: entry.id.index(),
                    name: entry.controller.name().to_string(),
                    level: entry.registration.level,
                    order: entry.registration.order,
                    in_service: entry.registration.in_service,
                    writes: entry
                        .controller
                        .writes()
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ModelAccess, StepContext};
    use pl_net::NetworkModel;

    struct Writer {
        name: String,
        cells: Vec<CellRef>,
    }

    impl Writer {
        fn new(name: &str, index: usize) -> Self {
            Self {
                name: name.to_string(),
                cells: vec![CellRef::new("load", index, "p_mw")],
            }
        }
    }

    impl Controller for Writer {
        fn name(&self) -> &str {
            &self.name
        }
        fn writes(&self) -> Vec<CellRef> {
            self.cells.clone()
        }
        fn time_step(&mut self, _ctx: &StepContext) -> ControlResult<()> {
            Ok(())
        }
        fn is_converged(&self, _net: &NetworkModel) -> ControlResult<bool> {
            Ok(true)
        }
        fn control_step(&mut self, _access: &mut ModelAccess<'_>) -> ControlResult<()> {
            Ok(())
        }
    }

    fn names(registry: &ControllerRegistry, ids: &[ControllerId]) -> Vec<String> {
        ids.iter()
            .map(|id| registry.controller(*id).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn execution_order_is_level_then_order_then_sequence() {
        let mut registry = ControllerRegistry::new();
        registry.add(Writer::new("c", 0), 1, 0).unwrap();
        registry.add(Writer::new("b", 1), 0, 5).unwrap();
        registry.add(Writer::new("a", 2), 0, 1).unwrap();
        registry.add(Writer::new("d", 3), 0, 5).unwrap();

        let order = registry.execution_order();
        assert_eq!(names(&registry, &order), vec!["a", "b", "d", "c"]);
        assert_eq!(registry.levels(), vec![0, 1]);
    }

    #[test]
    fn same_level_and_order_overlap_is_rejected() {
        let mut registry = ControllerRegistry::new();
        registry.add(Writer::new("first", 0), 0, 0).unwrap();
        let err = registry.add(Writer::new("second", 0), 0, 0).unwrap_err();
        assert!(matches!(err, ControlError::WriteConflict { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn overlap_with_distinct_order_or_level_is_allowed() {
        let mut registry = ControllerRegistry::new();
        registry.add(Writer::new("first", 0), 0, 0).unwrap();
        registry.add(Writer::new("later", 0), 0, 1).unwrap();
        registry.add(Writer::new("other level", 0), 1, 0).unwrap();
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn out_of_service_controllers_are_skipped_and_rechecked() {
        let mut registry = ControllerRegistry::new();
        let a = registry.add(Writer::new("a", 0), 0, 0).unwrap();
        registry.set_in_service(a, false).unwrap();
        let b = registry.add(Writer::new("b", 0), 0, 0).unwrap();

        assert_eq!(registry.execution_order(), vec![b]);
        assert!(registry.set_in_service(a, true).is_err());
        assert!(!registry.registration(a).unwrap().in_service);

        let diag = registry.diagnostic();
        assert_eq!(diag.len(), 2);
        assert_eq!(diag[1].name, "a");
        assert_eq!(diag[0].writes, vec!["load[0].p_mw".to_string()]);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let registry = ControllerRegistry::new();
        assert!(matches!(
            registry.controller(Id::from_index(3)),
            Err(ControlError::UnknownController { .. })
        ));
    }
}
