use crate::TestcaseId;
use crate::error::Error;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

/// how the fuzzed bytes reach the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// the bytes ride a command-line argument
    Inline,
    /// the bytes land in a file whose path rides the argument
    File,
}

/// the parsed `--call` command line. exactly one argument carries the
/// input placeholder; every dispatch substitutes the payload into it.
#[derive(Debug, Clone)]
pub struct Template {
    executable: String,
    args: Vec<String>,
    input_index: usize,
    kind: InputKind,
}

impl Template {
    pub fn parse(command_line: &str) -> Result<Self> {
        let inline = command_line.contains(crate::INPUT_NEEDLE);
        let file = command_line.contains(crate::FILE_NEEDLE);
        let kind = match (inline, file) {
            (true, false) => InputKind::Inline,
            (false, true) => InputKind::File,
            _ => return Err(Error::Template),
        };
        let mut tokens = command_line.split_whitespace();
        let executable = match tokens.next() {
            Some(executable) => executable.to_string(),
            None => return Err(Error::Template),
        };
        let args = tokens.map(str::to_string).collect::<Vec<_>>();
        let needle = match kind {
            InputKind::Inline => crate::INPUT_NEEDLE,
            InputKind::File => crate::FILE_NEEDLE,
        };
        let input_index = match args.iter().position(|arg| arg.contains(needle)) {
            Some(index) => index,
            None => return Err(Error::Template),
        };
        log::info!("executable: {}", executable);
        log::info!("  args: {:?}", args);
        Ok(Self {
            executable,
            args,
            input_index,
            kind,
        })
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// argv for one dispatch, with the payload substituted in
    pub fn materialize(
        &self,
        inputs: &Path,
        testcase: TestcaseId,
        payload: &[u8],
    ) -> std::io::Result<Vec<String>> {
        let substituted = match self.kind {
            InputKind::Inline => shell_escape(payload),
            InputKind::File => {
                let path = file_input(inputs, testcase, payload)?;
                path.to_string_lossy().to_string()
            }
        };
        let needle = match self.kind {
            InputKind::Inline => crate::INPUT_NEEDLE,
            InputKind::File => crate::FILE_NEEDLE,
        };
        let mut args = self.args.clone();
        args[self.input_index] = args[self.input_index].replace(needle, &substituted);
        Ok(args)
    }
}

/// write the payload to its per-testcase file
fn file_input(inputs: &Path, testcase: TestcaseId, payload: &[u8]) -> std::io::Result<PathBuf> {
    let path = inputs.join(format!("tc_{}", testcase));
    std::fs::write(&path, payload)?;
    Ok(path)
}

/// escape a payload for use as a literal argument: control bytes become
/// \xHH, quotes and backslashes get escaped
pub fn shell_escape(payload: &[u8]) -> String {
    let quoted = payload.contains(&b'"');
    let mut escaped = String::new();
    if quoted {
        escaped.push('"');
    }
    for byte in payload {
        match byte {
            b'"' | b'\\' | b'\'' => {
                escaped.push('\\');
                escaped.push(*byte as char);
            }
            byte if *byte < 32 || *byte > 126 => {
                escaped.push_str(&format!("\\x{:02X}", byte));
            }
            byte => escaped.push(*byte as char),
        }
    }
    if quoted {
        escaped.push('"');
    }
    escaped
}

/// parse `name=value;name=value` extra environment options; duplicates
/// and malformed entries are rejected with a trail
pub fn parse_env(options: &str) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for line in options.split(';') {
        if line.is_empty() {
            continue;
        }
        let mut sides = line.splitn(2, '=');
        match (sides.next(), sides.next()) {
            (Some(name), Some(value)) if !name.trim().is_empty() => {
                let name = name.trim().to_string();
                if env.contains_key(&name) {
                    log::error!("cannot have duplicate environment variables for {}", name);
                    continue;
                }
                env.insert(name, value.trim().to_string());
            }
            _ => log::error!("wrong environment format: {:?}, should be name=value", line),
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_template_parses() {
        let template = Template::parse("/bin/target --input __INPUT__ -v").unwrap();
        assert_eq!(template.kind(), InputKind::Inline);
        assert_eq!(template.executable(), "/bin/target");
    }

    #[test]
    fn file_template_parses() {
        let template = Template::parse("/bin/target __FILE__").unwrap();
        assert_eq!(template.kind(), InputKind::File);
    }

    #[test]
    fn both_or_neither_placeholder_is_rejected() {
        assert!(Template::parse("/bin/target __INPUT__ __FILE__").is_err());
        assert!(Template::parse("/bin/target --no-placeholder").is_err());
        assert!(Template::parse("").is_err());
    }

    #[test]
    fn inline_materialization_substitutes_the_payload() {
        let dir = tempfile::tempdir().unwrap();
        let template = Template::parse("/bin/target --data=__INPUT__").unwrap();
        let args = template.materialize(dir.path(), 1, b"abc").unwrap();
        assert_eq!(args, vec!["--data=abc"]);
    }

    #[test]
    fn file_materialization_writes_the_testcase() {
        let dir = tempfile::tempdir().unwrap();
        let template = Template::parse("/bin/target __FILE__").unwrap();
        let args = template.materialize(dir.path(), 7, b"payload").unwrap();
        assert_eq!(args.len(), 1);
        assert!(args[0].ends_with("tc_7"));
        assert_eq!(std::fs::read(&args[0]).unwrap(), b"payload");
    }

    #[test]
    fn escaping_hides_control_bytes() {
        assert_eq!(shell_escape(b"plain"), "plain");
        assert_eq!(shell_escape(b"a\nb"), "a\\x0Ab");
        assert_eq!(shell_escape(b"a'b"), "a\\'b");
        assert!(shell_escape(b"say \"hi\"").starts_with('"'));
    }

    #[test]
    fn extra_env_parses_and_rejects_duplicates() {
        let env = parse_env("A=1;B=two; A=3 ;broken");
        assert_eq!(env.len(), 2);
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "two");
    }
}
