use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub global: bool,
}

impl Variable {
    /// Parse one `name:scope:type:value` line. The value may itself contain
    /// colons. String values come back quoted.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split(':');
        let name = tokens.next()?;
        let scope = tokens.next()?;
        let type_name = tokens.next()?;
        let rest: Vec<&str> = tokens.collect();
        if rest.is_empty() {
            return None;
        }

        let mut value = rest.join(":").trim_end().to_string();
        if type_name == "string" {
            value = format!("\"{}\"", value);
        }

        Some(Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value,
            global: scope == "1",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    /// One based frame index.
    pub id: usize,
    pub line: i64,
    /// Source text of the line.
    pub name: String,
    pub file: String,
}

/// Variables reported by the last `vars`/`next`/`exc` response.
#[derive(Debug, Default)]
pub struct Variables {
    locals: Vec<Variable>,
    globals: Vec<Variable>,
    values: HashMap<String, String>,
}

impl Variables {
    pub fn clear(&mut self) {
        self.locals.clear();
        self.globals.clear();
        self.values.clear();
    }

    pub fn push(&mut self, variable: Variable) {
        self.values
            .insert(variable.name.to_lowercase(), variable.value.clone());
        if variable.global {
            self.globals.push(variable);
        } else {
            self.locals.push(variable);
        }
    }

    /// Append a global that is shown in the scopes but not used for lookups.
    pub fn push_synthetic_global(&mut self, name: &str, type_name: &str, value: String) {
        self.globals.push(Variable {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value,
            global: true,
        });
    }

    /// Case-insensitive lookup.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_lowercase())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn locals(&self) -> &[Variable] {
        &self.locals
    }

    pub fn globals(&self) -> &[Variable] {
        &self.globals
    }

    /// Read `count` variable lines following the count line at `header`.
    pub fn fill<S: AsRef<str>>(&mut self, lines: &[S], header: usize, count: usize) {
        for line in lines.iter().skip(header + 1).take(count) {
            if let Some(variable) = Variable::parse(line.as_ref()) {
                self.push(variable);
            }
        }
    }
}

/// Parse stack frames as groups of three lines (line number, file, source
/// text) starting at `start`. `map_file` turns server paths into local ones.
pub fn parse_stack<S, F>(lines: &[S], start: usize, mut map_file: F) -> Vec<StackEntry>
where
    S: AsRef<str>,
    F: FnMut(&str) -> String,
{
    let mut frames = Vec::new();
    let mut index = start;
    while index < lines.len().saturating_sub(2) {
        let line = lines[index].as_ref().trim().parse().unwrap_or(0);
        let file = map_file(lines[index + 1].as_ref().trim());
        let name = lines[index + 2].as_ref().trim().to_string();
        frames.push(StackEntry {
            id: frames.len() + 1,
            line,
            name,
            file,
        });
        index += 3;
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_values_are_quoted() {
        let var = Variable::parse("greeting:0:string:hello: world  ").unwrap();
        assert_eq!(var.value, "\"hello: world\"");
        assert!(!var.global);
    }

    #[test]
    fn short_lines_are_skipped() {
        assert!(Variable::parse("x:1:number").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut vars = Variables::default();
        vars.push(Variable::parse("Counter:1:number:3").unwrap());
        assert_eq!(vars.value_of("COUNTER"), Some("3"));
        assert_eq!(vars.globals().len(), 1);
    }

    #[test]
    fn stack_start_past_end_is_empty() {
        let lines = ["4", "/w/a.cscs", "x = 1;"];
        assert!(parse_stack(&lines, usize::MAX, |file| file.to_string()).is_empty());
    }

    #[test]
    fn stack_ignores_incomplete_group() {
        let lines = ["4", "/w/a.cscs", "x = 1;", "9", "/w/b.cscs"];
        let frames = parse_stack(&lines, 0, |file| file.to_string());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 1);
        assert_eq!(frames[0].line, 4);
    }
}
