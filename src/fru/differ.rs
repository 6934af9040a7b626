use crate::events::{AlertType, FruStatus, Health};
use crate::state::{FaultMap, FaultRecord};

/// Apply one observed status to the fault map
///
/// Returns the transition to alert on, if any. After the call the map holds
/// an entry for the resource if and only if its health is not ok.
pub fn apply_status(faults: &mut FaultMap, status: &FruStatus) -> Option<AlertType> {
    let previous = faults.get(&status.resource_id).map(|r| (r.health, r.alert_type));

    let alert_type = match (status.health, previous) {
        (Health::Ok, None) => return None,
        (Health::Ok, Some((_, previous_alert))) => {
            faults.remove(&status.resource_id);
            return Some(if previous_alert == AlertType::Missing {
                AlertType::Insertion
            } else {
                AlertType::FaultResolved
            });
        }
        (Health::Fault, None | Some((Health::Degraded | Health::Ok, _))) => {
            if status.is_not_installed() {
                AlertType::Missing
            } else {
                AlertType::Fault
            }
        }
        (Health::Degraded, None | Some((Health::Fault | Health::Ok, _))) => AlertType::Fault,
        (Health::Fault, Some((Health::Fault, _)))
        | (Health::Degraded, Some((Health::Degraded, _))) => return None,
    };

    faults.insert(FaultRecord {
        resource_id: status.resource_id.clone(),
        health: status.health,
        alert_type,
    });
    Some(alert_type)
}
