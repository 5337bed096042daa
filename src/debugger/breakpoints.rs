use std::collections::HashMap;

use crate::parser::next_executable_line;

use super::paths::canonical_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    /// Zero based.
    pub line: usize,
    pub verified: bool,
}

#[derive(Debug, Default)]
struct FileBreakpoints {
    /// Insertion order, for re-sending to the server.
    order: Vec<u32>,
    by_id: HashMap<u32, Breakpoint>,
    by_line: HashMap<usize, u32>,
}

impl FileBreakpoints {
    fn remove_id(&mut self, id: u32) -> Option<Breakpoint> {
        let bp = self.by_id.remove(&id)?;
        self.order.retain(|&other| other != id);
        if self.by_line.get(&bp.line) == Some(&id) {
            self.by_line.remove(&bp.line);
        }
        Some(bp)
    }
}

/// Breakpoints of every file, keyed by canonical path.
#[derive(Debug)]
pub struct Breakpoints {
    files: HashMap<String, FileBreakpoints>,
    next_id: u32,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self::new()
    }
}

impl Breakpoints {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register an unverified breakpoint. A breakpoint already on that line
    /// is replaced.
    pub fn add(&mut self, path: &str, line: usize) -> Breakpoint {
        let bp = Breakpoint {
            id: self.next_id,
            line,
            verified: false,
        };
        self.next_id += 1;

        let file = self.files.entry(canonical_key(path)).or_default();
        if let Some(&old) = file.by_line.get(&line) {
            file.remove_id(old);
        }
        file.order.push(bp.id);
        file.by_id.insert(bp.id, bp);
        file.by_line.insert(line, bp.id);
        log::debug!("breakpoint {} set at {}:{}", bp.id, path, line);
        bp
    }

    pub fn remove(&mut self, path: &str, line: usize) -> Option<Breakpoint> {
        let file = self.files.get_mut(&canonical_key(path))?;
        let id = match file.by_line.get(&line) {
            Some(&id) => id,
            None => *file.order.iter().find(|id| file.by_id[*id].line == line)?,
        };
        file.remove_id(id)
    }

    pub fn clear(&mut self, path: &str) {
        self.files.remove(&canonical_key(path));
    }

    pub fn get(&self, path: &str, id: u32) -> Option<Breakpoint> {
        self.files
            .get(&canonical_key(path))
            .and_then(|file| file.by_id.get(&id).copied())
    }

    pub fn at_line(&self, path: &str, line: usize) -> Option<Breakpoint> {
        let file = self.files.get(&canonical_key(path))?;
        let id = file.by_line.get(&line)?;
        file.by_id.get(id).copied()
    }

    /// Lines in insertion order.
    pub fn lines(&self, path: &str) -> Vec<usize> {
        self.files
            .get(&canonical_key(path))
            .map(|file| file.order.iter().map(|id| file.by_id[id].line).collect())
            .unwrap_or_default()
    }

    /// Canonical keys of files that have breakpoints registered.
    pub fn files(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Check unverified breakpoints of `path` against its source. A
    /// breakpoint on a blank or comment line moves down to the next line of
    /// code. Returns the breakpoints that changed.
    pub fn verify<S: AsRef<str>>(&mut self, path: &str, source: &[S]) -> Vec<Breakpoint> {
        let Some(file) = self.files.get_mut(&canonical_key(path)) else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for id in file.order.clone() {
            let Some(mut bp) = file.by_id.get(&id).copied() else {
                continue;
            };
            if bp.verified || bp.line >= source.len() {
                continue;
            }

            let target = next_executable_line(source, bp.line).unwrap_or(bp.line);
            if target != bp.line {
                if file.by_line.get(&bp.line) == Some(&id) {
                    file.by_line.remove(&bp.line);
                }
                if let Some(&other) = file.by_line.get(&target) {
                    if other != id {
                        // Already one on the landing line; merge into it.
                        file.remove_id(id);
                        if let Some(existing) = file.by_id.get_mut(&other) {
                            existing.verified = true;
                            changed.push(Breakpoint { id, ..*existing });
                        }
                        continue;
                    }
                }
                bp.line = target;
                file.by_line.insert(target, id);
            }
            bp.verified = true;
            file.by_id.insert(id, bp);
            log::debug!("verified breakpoint {} at line {}", id, bp.line);
            changed.push(bp);
        }
        changed
    }

    /// Mark one breakpoint verified; returns it if this changed anything.
    pub fn mark_verified(&mut self, path: &str, line: usize) -> Option<Breakpoint> {
        let file = self.files.get_mut(&canonical_key(path))?;
        let id = *file.by_line.get(&line)?;
        let bp = file.by_id.get_mut(&id)?;
        if bp.verified {
            return None;
        }
        bp.verified = true;
        Some(*bp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: [&str; 5] = ["a = 1;", "", "// note", "b = 2;", "c = 3;"];

    #[test]
    fn ids_are_monotonic() {
        let mut bps = Breakpoints::new();
        let a = bps.add("/w/t.cscs", 0);
        let b = bps.add("/w/u.cscs", 0);
        assert!(b.id > a.id);
    }

    #[test]
    fn verify_skips_blank_and_comment_lines() {
        let mut bps = Breakpoints::new();
        bps.add("/w/t.cscs", 1);
        let changed = bps.verify("/w/t.cscs", &SOURCE);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].line, 3);
        assert!(changed[0].verified);
        assert!(bps.at_line("/w/t.cscs", 3).is_some());
        assert!(bps.at_line("/w/t.cscs", 1).is_none());
    }

    #[test]
    fn keys_ignore_case() {
        let mut bps = Breakpoints::new();
        bps.add("/W/T.cscs", 4);
        assert_eq!(bps.lines("/w/t.cscs"), vec![4]);
        assert!(bps.remove("/w/T.CSCS", 4).is_some());
        assert!(bps.lines("/w/t.cscs").is_empty());
    }
}
