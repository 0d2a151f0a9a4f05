//! Process tree discovery

use corral_host_api::{ProcessTree, TREE_MARKER_ENV};
use nix::unistd::getpgid;
use std::collections::{BTreeSet, HashMap};
use sysinfo::{Pid, ProcessStatus, System};

/// A process table row, reduced to what tree discovery needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub pgid: Option<u32>,
    /// Carries the searched-for tree marker in its environment
    pub marked: bool,
    pub defunct: bool,
}

/// Processes found for one tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeMembers {
    pub pids: BTreeSet<u32>,
    /// The tree's process group, when it still belongs to the tree
    pub group: Option<u32>,
}

impl TreeMembers {
    pub fn is_empty(&self) -> bool {
        self.pids.is_empty() && self.group.is_none()
    }

    /// Fold in a later scan
    pub fn merge(&mut self, other: TreeMembers) {
        self.pids.extend(other.pids);
        self.group = self.group.or(other.group);
    }
}

fn is_defunct(status: ProcessStatus) -> bool {
    matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
}

fn group_of(pid: u32) -> Option<u32> {
    getpgid(Some(nix::unistd::Pid::from_raw(pid as i32)))
        .ok()
        .map(|pgid| pgid.as_raw() as u32)
}

/// Current process table, flagging processes that carry `marker`
pub fn process_table(marker: Option<&str>) -> Vec<ProcEntry> {
    let mut system = System::new();
    system.refresh_processes();

    let needle = marker.map(|m| format!("{}={}", TREE_MARKER_ENV, m));

    system
        .processes()
        .values()
        .map(|process| {
            let pid = process.pid().as_u32();
            ProcEntry {
                pid,
                ppid: process.parent().map(|p| p.as_u32()),
                pgid: group_of(pid),
                marked: needle
                    .as_ref()
                    .is_some_and(|n| process.environ().iter().any(|var| var == n)),
                defunct: is_defunct(process.status()),
            }
        })
        .collect()
}

/// Members of `tree` within a process table
///
/// With a marker, only marked processes seed the search, so a reused root
/// pid is never picked up. The group counts as the tree's while a marked
/// process is still in it. Without a marker the root pid and its group are
/// trusted as given. Children of any member are members.
pub fn tree_members(tree: &ProcessTree, table: &[ProcEntry]) -> TreeMembers {
    let mut seeds: Vec<u32> = match tree.marker {
        Some(_) => table.iter().filter(|e| e.marked).map(|e| e.pid).collect(),
        None => vec![tree.pid],
    };

    let group = tree.pgid.filter(|&pgid| match tree.marker {
        Some(_) => table.iter().any(|e| e.marked && e.pgid == Some(pgid)),
        None => table.iter().any(|e| e.pid == tree.pid && e.pgid == Some(pgid)),
    });

    if let Some(pgid) = group {
        seeds.extend(table.iter().filter(|e| e.pgid == Some(pgid)).map(|e| e.pid));
    }

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in table {
        if let Some(ppid) = entry.ppid {
            children.entry(ppid).or_default().push(entry.pid);
        }
    }

    let mut pids = BTreeSet::new();
    while let Some(pid) = seeds.pop() {
        if !pids.insert(pid) {
            continue;
        }
        if let Some(kids) = children.get(&pid) {
            seeds.extend(kids.iter().copied().filter(|kid| !pids.contains(kid)));
        }
    }

    TreeMembers { pids, group }
}

/// Scan the system for what is left of `tree`
pub fn collect_tree(tree: &ProcessTree) -> TreeMembers {
    tree_members(tree, &process_table(tree.marker.as_deref()))
}

/// Whether a pid names a running (non-zombie) process
pub fn is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_process(pid)
        && system
            .process(pid)
            .is_some_and(|process| !is_defunct(process.status()))
}
