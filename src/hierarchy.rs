//! Read-only employee → manager graph used to scope team queries.

use std::collections::{HashMap, HashSet, VecDeque};

use sea_orm::{ConnectionTrait, DbErr, EntityTrait};
use uuid::Uuid;

use crate::models::employee;

/// Snapshot of `employees.manager_id` edges.
#[derive(Debug, Clone, Default)]
pub struct ManagerHierarchy {
    reports: HashMap<Uuid, Vec<Uuid>>,
}

impl ManagerHierarchy {
    /// Builds the hierarchy from `(employee, manager)` pairs.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, Option<Uuid>)>,
    {
        let mut reports: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (employee_id, manager_id) in edges {
            if let Some(manager_id) = manager_id {
                if manager_id != employee_id {
                    reports.entry(manager_id).or_default().push(employee_id);
                }
            }
        }
        for direct in reports.values_mut() {
            direct.sort();
        }
        Self { reports }
    }

    pub async fn load<C>(conn: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let employees = employee::Entity::find().all(conn).await?;
        Ok(Self::from_edges(
            employees.into_iter().map(|row| (row.id, row.manager_id)),
        ))
    }

    pub fn direct_reports(&self, manager_id: Uuid) -> &[Uuid] {
        self.reports
            .get(&manager_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Everyone below `manager_id`, breadth first. Cycles in the data are tolerated; the
    /// manager is never part of the result.
    pub fn all_reports(&self, manager_id: Uuid) -> Vec<Uuid> {
        let mut seen = HashSet::from([manager_id]);
        let mut queue = VecDeque::from([manager_id]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            for &report in self.direct_reports(current) {
                if seen.insert(report) {
                    result.push(report);
                    queue.push_back(report);
                }
            }
        }
        result
    }

    pub fn manages(&self, manager_id: Uuid, employee_id: Uuid) -> bool {
        self.all_reports(manager_id).contains(&employee_id)
    }
}
