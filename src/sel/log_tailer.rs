use crate::events::LogEntry;
use log::warn;
use std::collections::HashMap;

/// An entry not yet covered by the persisted cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnseenEntry {
    pub entry: LogEntry,
    /// Last unseen entry of its device type in this cycle; only these get
    /// live sensor readings
    pub terminal: bool,
}

/// What one cycle has to dispatch, and where the cursor lands afterwards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailPlan {
    pub unseen: Vec<UnseenEntry>,
    /// Whether the cursor index was present in the buffer
    pub cursor_found: bool,
}

impl TailPlan {
    /// Cursor value to commit once every unseen entry has been dispatched
    pub fn next_cursor(&self) -> Option<u64> {
        self.unseen.last().map(|u| u.entry.index)
    }

    pub fn is_empty(&self) -> bool {
        self.unseen.is_empty()
    }
}

/// Parse buffered `sel list` lines, skipping records that do not parse
pub fn parse_buffer<S: AsRef<str>>(lines: &[S]) -> Vec<LogEntry> {
    lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match LogEntry::from_sel_line(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping SEL record {:?}: {}", line, e);
                None
            }
        })
        .collect()
}

/// Work out which entries follow `cursor` and which of them are terminal
///
/// When no entry carries the cursor index the log has been cleared or has
/// rotated past it, and every entry is replayed.
pub fn plan(entries: Vec<LogEntry>, cursor: u64) -> TailPlan {
    let position = entries.iter().position(|entry| entry.index == cursor);
    let cursor_found = position.is_some();
    let unseen: Vec<LogEntry> = match position {
        Some(pos) => entries.into_iter().skip(pos + 1).collect(),
        None => entries,
    };

    let mut last_for_device: HashMap<&str, usize> = HashMap::new();
    for (pos, entry) in unseen.iter().enumerate() {
        last_for_device.insert(entry.device_type.as_str(), pos);
    }
    let terminal: Vec<bool> = (0..unseen.len())
        .map(|pos| {
            last_for_device
                .get(unseen[pos].device_type.as_str())
                .is_some_and(|last| *last == pos)
        })
        .collect();

    TailPlan {
        unseen: unseen
            .into_iter()
            .zip(terminal)
            .map(|(entry, terminal)| UnseenEntry { entry, terminal })
            .collect(),
        cursor_found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    const DEVICES: [&str; 4] = [
        "Fan #0x30",
        "Power Supply #0x61",
        "Drive Slot / Bay #0xf1",
        "System Event",
    ];

    fn line(index: u64, device: &str, description: &str) -> String {
        format!(
            "{:x} | 04/16/2019 | 05:29:09 | {} | {} | Asserted",
            index, device, description
        )
    }

    /// A log of strictly increasing indices over a handful of devices
    #[derive(Debug, Clone)]
    struct SelLog(Vec<String>);

    impl Arbitrary for SelLog {
        fn arbitrary(g: &mut Gen) -> Self {
            let len = usize::arbitrary(g) % 20;
            let mut index = u64::arbitrary(g) % 8 + 1;
            let mut lines = Vec::with_capacity(len);
            for _ in 0..len {
                let device = g.choose(&DEVICES).copied().unwrap_or("Fan #0x30");
                lines.push(line(index, device, "Lower Critical going low"));
                index += u64::arbitrary(g) % 3 + 1;
            }
            SelLog(lines)
        }
    }

    #[test]
    fn test_resume_after_cursor() {
        let lines = vec![
            line(2, "Fan #0x30", "Lower Non-critical going low"),
            line(3, "Fan #0x30", "Lower Critical going low"),
            line(4, "Fan #0x30", "Lower Non-recoverable going low"),
        ];
        let plan = plan(parse_buffer(&lines), 2);

        assert!(plan.cursor_found);
        let indices: Vec<u64> = plan.unseen.iter().map(|u| u.entry.index).collect();
        assert_eq!(indices, vec![3, 4]);
        assert!(!plan.unseen[0].terminal);
        assert!(plan.unseen[1].terminal);
        assert_eq!(plan.next_cursor(), Some(4));
    }

    #[test]
    fn test_cursor_missing_replays_everything() {
        let lines = vec![
            line(1, "Fan #0x30", "Lower Critical going low"),
            line(2, "Power Supply #0x61", "Presence detected"),
        ];
        let plan = plan(parse_buffer(&lines), 0x40);
        assert!(!plan.cursor_found);
        assert_eq!(plan.unseen.len(), 2);
        assert!(plan.unseen.iter().all(|u| u.terminal));
    }

    #[test]
    fn test_cursor_at_end_yields_nothing() {
        let lines = vec![line(1, "Fan #0x30", "x"), line(2, "Fan #0x30", "y")];
        let plan = plan(parse_buffer(&lines), 2);
        assert!(plan.is_empty());
        assert_eq!(plan.next_cursor(), None);
    }

    #[test]
    fn test_empty_buffer() {
        let lines: Vec<String> = Vec::new();
        let plan = plan(parse_buffer(&lines), 5);
        assert!(!plan.cursor_found);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_terminal_per_device_type() {
        let lines = vec![
            line(0xa, "Fan #0x30", "Lower Critical going low"),
            line(0xb, "Power Supply #0x61", "Presence detected"),
            line(0xc, "Fan #0x31", "Upper Critical going high"),
            line(0xd, "Power Supply #0x62", "Failure detected"),
        ];
        let plan = plan(parse_buffer(&lines), 9);
        let flags: Vec<bool> = plan.unseen.iter().map(|u| u.terminal).collect();
        assert_eq!(flags, vec![false, false, true, true]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let lines = vec![
            line(1, "Fan #0x30", "Lower Critical going low"),
            "SEL has no entries".to_string(),
            String::new(),
            line(2, "Fan #0x30", "Lower Critical going low"),
        ];
        let entries = parse_buffer(&lines);
        assert_eq!(entries.len(), 2);
    }

    #[quickcheck]
    fn prop_replay_is_idempotent(log: SelLog, pick: usize) -> bool {
        let entries = parse_buffer(&log.0);
        let cursor = if entries.is_empty() {
            0
        } else {
            entries[pick % entries.len()].index
        };
        plan(entries.clone(), cursor) == plan(entries, cursor)
    }

    #[quickcheck]
    fn prop_unknown_cursor_replays_all(log: SelLog) -> bool {
        let entries = parse_buffer(&log.0);
        let len = entries.len();
        // indices start at 1, so 0 is never present
        let plan = plan(entries, 0);
        !plan.cursor_found && plan.unseen.len() == len
    }

    #[quickcheck]
    fn prop_one_terminal_entry_per_device(log: SelLog, pick: usize) -> bool {
        let entries = parse_buffer(&log.0);
        let cursor = if entries.is_empty() {
            0
        } else {
            entries[pick % entries.len()].index
        };
        let plan = plan(entries, cursor);

        let mut devices: Vec<&str> = plan
            .unseen
            .iter()
            .map(|u| u.entry.device_type.as_str())
            .collect();
        devices.sort_unstable();
        devices.dedup();

        devices.iter().all(|device| {
            let of_device: Vec<&UnseenEntry> = plan
                .unseen
                .iter()
                .filter(|u| u.entry.device_type == *device)
                .collect();
            let max_index = of_device.iter().map(|u| u.entry.index).max();
            of_device.iter().filter(|u| u.terminal).count() == 1
                && of_device
                    .iter()
                    .all(|u| u.terminal == (Some(u.entry.index) == max_index))
        })
    }
}
