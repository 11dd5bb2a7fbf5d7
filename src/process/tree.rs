//! Process tree construction and bottom-up usage aggregation.
//!
//! The tree is an index-addressed arena: nodes live in a flat `Vec` and refer
//! to their children by index, so no parent back-references exist after the
//! build. Roots are the processes whose parent is pid 1.

use ahash::AHashMap as HashMap;
use tracing::debug;

use crate::process::record::{ProcessRecord, ROOT_PID};
use crate::process::rules::ProcessRules;

/// The three aggregated resource fields of a process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub rss_kb: u64,
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

impl Usage {
    pub fn of(record: &ProcessRecord) -> Self {
        Self {
            rss_kb: record.rss_kb,
            cpu_percent: record.cpu_percent,
            mem_percent: record.mem_percent,
        }
    }

    pub fn add(&mut self, other: Usage) {
        self.rss_kb = self.rss_kb.saturating_add(other.rss_kb);
        self.cpu_percent += other.cpu_percent;
        self.mem_percent += other.mem_percent;
    }

    pub fn apply_to(self, record: &mut ProcessRecord) {
        record.rss_kb = record.rss_kb.saturating_add(self.rss_kb);
        record.cpu_percent += self.cpu_percent;
        record.mem_percent += self.mem_percent;
    }
}

/// A process plus the indices of its children in the arena.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Aggregated record: own usage plus the whole subtree.
    pub record: ProcessRecord,
    /// The process's own usage, before aggregation.
    pub own: Usage,
    pub children: Vec<usize>,
}

/// Aggregated process tree rooted below pid 1.
#[derive(Debug, Clone, Default)]
pub struct ProcessTree {
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
}

impl ProcessTree {
    /// Links flat records into a tree and aggregates rss/cpu/mem upward.
    ///
    /// Kernel helper processes are dropped before linking. Records whose parent
    /// chain never reaches pid 1 are left out. Subtrees whose root matches the
    /// self-identification rule are excluded from the tree and from every
    /// ancestor's sums.
    pub fn build(records: Vec<ProcessRecord>, rules: &ProcessRules) -> Self {
        let records: Vec<ProcessRecord> = records
            .into_iter()
            .filter(|r| !r.is_kernel_helper())
            .collect();

        let mut children_of: HashMap<u32, Vec<usize>> = HashMap::new();
        for (idx, rec) in records.iter().enumerate() {
            children_of.entry(rec.ppid).or_default().push(idx);
        }

        let mut tree = ProcessTree::default();
        let mut placed: Vec<Option<usize>> = vec![None; records.len()];

        // Pre-order placement; each input record is placed at most once, which
        // also guards against duplicate pids forming a loop.
        let mut stack: Vec<(usize, Option<usize>)> = children_of
            .get(&ROOT_PID)
            .map(|v| v.iter().rev().map(|&i| (i, None)).collect())
            .unwrap_or_default();

        while let Some((input_idx, parent)) = stack.pop() {
            if placed[input_idx].is_some() {
                continue;
            }
            let record = &records[input_idx];
            if rules.is_self(&record.executable) {
                debug!("Excluding self-identified subtree at pid {}", record.pid);
                continue;
            }

            let node_idx = tree.nodes.len();
            placed[input_idx] = Some(node_idx);
            tree.nodes.push(TreeNode {
                record: record.clone(),
                own: Usage::of(record),
                children: Vec::new(),
            });
            match parent {
                Some(p) => tree.nodes[p].children.push(node_idx),
                None => tree.roots.push(node_idx),
            }

            if let Some(kids) = children_of.get(&record.pid) {
                for &kid in kids.iter().rev() {
                    stack.push((kid, Some(node_idx)));
                }
            }
        }

        tree.aggregate();

        debug!(
            "Built process tree: {} nodes, {} roots ({} input records)",
            tree.nodes.len(),
            tree.roots.len(),
            records.len()
        );
        tree
    }

    /// Folds every child's already aggregated usage into its parent.
    ///
    /// Nodes were pushed in pre-order, so children always have larger indices
    /// than their parent and a reverse sweep visits them first.
    fn aggregate(&mut self) {
        for idx in (0..self.nodes.len()).rev() {
            let mut descendants = Usage::default();
            for &child in &self.nodes[idx].children {
                descendants.add(Usage::of(&self.nodes[child].record));
            }
            descendants.apply_to(&mut self.nodes[idx].record);
        }
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn node(&self, idx: usize) -> &TreeNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Renders the tree as indented text, one process per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&r| (r, 0)).collect();
        while let Some((idx, depth)) = stack.pop() {
            let rec = &self.nodes[idx].record;
            out.push_str(&format!(
                "{}{} {} (rss={} KB, cpu={:.1}%, mem={:.1}%)\n",
                "  ".repeat(depth),
                rec.pid,
                rec.command,
                rec.rss_kb,
                rec.cpu_percent,
                rec.mem_percent
            ));
            for &child in self.nodes[idx].children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pid: u32, ppid: u32, rss: u64, command: &str) -> ProcessRecord {
        ProcessRecord::new(pid, ppid, rss, rss as f64 / 10.0, rss as f64 / 100.0, 0, command)
    }

    fn find<'a>(tree: &'a ProcessTree, pid: u32) -> &'a TreeNode {
        (0..tree.len())
            .map(|i| tree.node(i))
            .find(|n| n.record.pid == pid)
            .expect("pid present in tree")
    }

    #[test]
    fn test_empty_input_gives_empty_tree() {
        let tree = ProcessTree::build(Vec::new(), &ProcessRules::default());
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
    }

    #[test]
    fn test_aggregation_sums_whole_subtree() {
        let records = vec![
            rec(10, 1, 100, "sshd"),
            rec(11, 10, 20, "sshd: user"),
            rec(12, 11, 5, "-bash"),
            rec(13, 12, 300, "vim notes.txt"),
            rec(20, 1, 50, "cron"),
        ];
        let tree = ProcessTree::build(records, &ProcessRules::default());

        assert_eq!(tree.roots().len(), 2);
        assert_eq!(find(&tree, 13).record.rss_kb, 300);
        assert_eq!(find(&tree, 12).record.rss_kb, 305);
        assert_eq!(find(&tree, 11).record.rss_kb, 325);
        assert_eq!(find(&tree, 10).record.rss_kb, 425);
        assert_eq!(find(&tree, 20).record.rss_kb, 50);
        assert_eq!(find(&tree, 10).own.rss_kb, 100);
        assert!((find(&tree, 10).record.cpu_percent - 42.5).abs() < 1e-9);
        assert!((find(&tree, 10).record.mem_percent - 4.25).abs() < 1e-9);
    }

    #[test]
    fn test_kernel_helper_records_are_excluded() {
        let records = vec![
            rec(2, 0, 0, "kthreadd"),
            rec(30, 2, 999, "kworker/0:0"),
            rec(40, 1, 10, "systemd-journald"),
        ];
        let tree = ProcessTree::build(records, &ProcessRules::default());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node(tree.roots()[0]).record.pid, 40);
    }

    #[test]
    fn test_dangling_parents_are_tolerated() {
        let records = vec![rec(50, 4242, 10, "orphan"), rec(51, 1, 10, "nginx")];
        let tree = ProcessTree::build(records, &ProcessRules::default());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node(tree.roots()[0]).record.pid, 51);
    }

    #[test]
    fn test_self_subtree_excluded_from_ancestor_sums() {
        let records = vec![
            rec(60, 1, 10, "supervisord"),
            rec(61, 60, 500, "/usr/bin/cloudstats-agent"),
            rec(62, 61, 70, "ps axo pid"),
            rec(63, 60, 1, "worker"),
        ];
        let tree = ProcessTree::build(records, &ProcessRules::default());
        assert_eq!(tree.len(), 2);
        assert_eq!(find(&tree, 60).record.rss_kb, 11);
    }

    #[test]
    fn test_duplicate_pid_loop_terminates() {
        // A record claiming pid 1 as its own parent would otherwise loop forever.
        let records = vec![rec(1, 1, 1, "weird"), rec(70, 1, 2, "app")];
        let tree = ProcessTree::build(records, &ProcessRules::default());
        assert!(tree.len() <= 2);
    }

    #[test]
    fn test_render_indents_children() {
        let records = vec![rec(10, 1, 1, "tmux"), rec(11, 10, 1, "htop")];
        let tree = ProcessTree::build(records, &ProcessRules::default());
        let text = tree.render();
        assert!(text.starts_with("10 tmux"));
        assert!(text.contains("\n  11 htop"));
    }
}
