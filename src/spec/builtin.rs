use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

use super::{MacroContext, ParsedSpec, SourceFlags, SourceReference, SpecEvaluator, SpecParseError};
use crate::fs::FileSystem;

const MAX_EXPANSION_DEPTH: usize = 32;

/// Section keywords that end a preamble and start script or file-list content
const SCRIPT_SECTIONS: &[&str] = &[
    "%prep",
    "%conf",
    "%build",
    "%install",
    "%check",
    "%clean",
    "%files",
    "%changelog",
    "%pre",
    "%post",
    "%preun",
    "%postun",
    "%pretrans",
    "%posttrans",
    "%preuntrans",
    "%postuntrans",
    "%verifyscript",
    "%triggerprein",
    "%triggerin",
    "%triggerun",
    "%triggerpostun",
    "%filetriggerin",
    "%filetriggerun",
    "%filetriggerpostun",
    "%transfiletriggerin",
    "%transfiletriggerun",
    "%transfiletriggerpostun",
    "%generate_buildrequires",
];

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9]*)\s*(?:\([^)]*\))?\s*:\s*(.*)$").expect("valid tag regex")
    })
}

/// Reads the preamble of a spec without rpm.
///
/// Conditionals (`%if`, `%ifarch`, ...) are not evaluated: every branch contributes its tags.
pub struct BuiltinSpecEvaluator {
    fs: Arc<dyn FileSystem>,
}

impl BuiltinSpecEvaluator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

impl SpecEvaluator for BuiltinSpecEvaluator {
    fn parse_spec(
        &self,
        spec_path: &Path,
        macros: &MacroContext,
    ) -> Result<ParsedSpec, SpecParseError> {
        let content = self
            .fs
            .read_to_string(spec_path)
            .map_err(|e| SpecParseError::new(spec_path, format!("{:#}", e)))?;

        let parsed = read_spec(&content, macros).map_err(|e| SpecParseError::new(spec_path, e))?;
        debug!(
            spec = %spec_path.display(),
            name = %parsed.name,
            version = %parsed.version,
            sources = parsed.sources.len(),
            "Evaluated spec"
        );
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    SubPackage,
    Description,
    SourceList,
    PatchList,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Source,
    Patch,
}

impl Kind {
    fn label(self) -> &'static str {
        match self {
            Kind::Source => "Source",
            Kind::Patch => "Patch",
        }
    }

    fn flags(self) -> SourceFlags {
        match self {
            Kind::Source => SourceFlags::SOURCE,
            Kind::Patch => SourceFlags::PATCH,
        }
    }
}

#[derive(Default)]
struct SpecReader {
    macros: BTreeMap<String, String>,
    name: Option<String>,
    version: Option<String>,
    release: Option<String>,
    has_description: bool,
    sources: Vec<SourceReference>,
    used: BTreeSet<(u32, bool)>,
    no_source: BTreeSet<u32>,
    no_patch: BTreeSet<u32>,
}

/// Evaluates spec text into a [`ParsedSpec`]; errors are plain messages with line numbers.
pub(crate) fn read_spec(content: &str, context: &MacroContext) -> Result<ParsedSpec, String> {
    let mut reader = SpecReader::default();
    for (name, value) in context.iter() {
        reader.macros.insert(name.to_string(), value.to_string());
    }

    let mut section = Section::Preamble;
    for (number, raw) in content.lines().enumerate() {
        let line_no = number + 1;
        let line = raw.trim();

        if line.starts_with('%') {
            if let Some(next) = reader.directive(line, line_no)? {
                section = next;
            }
            continue;
        }

        match section {
            Section::Preamble | Section::SubPackage => {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                reader.tag(line, line_no, section == Section::Preamble)?;
            }
            Section::SourceList | Section::PatchList => {
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let kind = if section == Section::SourceList {
                    Kind::Source
                } else {
                    Kind::Patch
                };
                let value = reader.expand(line, line_no)?;
                reader.declare(kind, None, value, line_no)?;
            }
            Section::Description | Section::Other => {}
        }
    }

    reader.finish()
}

impl SpecReader {
    /// Handles a `%` line; returns the section it opens, if any
    fn directive(&mut self, line: &str, line_no: usize) -> Result<Option<Section>, String> {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or_default();

        match keyword {
            "%define" | "%global" => {
                let rest = line[keyword.len()..].trim_start();
                let (name, body) = match rest.split_once(char::is_whitespace) {
                    Some((name, body)) => (name, body.trim()),
                    None => return Err(format!("line {}: Macro {} has empty body", line_no, rest)),
                };
                if name.contains('(') {
                    trace!(macro_name = name, "Skipping parametric macro");
                    return Ok(None);
                }
                let body = if keyword == "%global" {
                    self.expand(body, line_no)?
                } else {
                    body.to_string()
                };
                self.macros.insert(name.to_string(), body);
                Ok(None)
            }
            "%undefine" => {
                if let Some(name) = words.next() {
                    self.macros.remove(name);
                }
                Ok(None)
            }
            "%description" => {
                if words.next().is_none() {
                    self.has_description = true;
                }
                Ok(Some(Section::Description))
            }
            "%package" => Ok(Some(Section::SubPackage)),
            "%sourcelist" => Ok(Some(Section::SourceList)),
            "%patchlist" => Ok(Some(Section::PatchList)),
            _ if SCRIPT_SECTIONS.contains(&keyword) => Ok(Some(Section::Other)),
            _ => Ok(None),
        }
    }

    fn tag(&mut self, line: &str, line_no: usize, main_package: bool) -> Result<(), String> {
        let captures = tag_regex()
            .captures(line)
            .ok_or_else(|| format!("line {}: Unknown tag: {}", line_no, line))?;
        let tag = captures[1].to_lowercase();
        let value = self.expand(captures[2].trim(), line_no)?;

        if let Some(number) = tag.strip_prefix("source") {
            return self.declare(Kind::Source, parse_number(number, line_no)?, value, line_no);
        }
        if let Some(number) = tag.strip_prefix("patch") {
            return self.declare(Kind::Patch, parse_number(number, line_no)?, value, line_no);
        }

        match tag.as_str() {
            "nosource" => self.no_source.extend(parse_number_list(&value, line_no)?),
            "nopatch" => self.no_patch.extend(parse_number_list(&value, line_no)?),
            _ if !main_package => {}
            "name" => self.name = Some(value.clone()),
            "version" => {
                if value.contains('-') {
                    return Err(format!("line {}: Illegal char '-' in Version: {}", line_no, value));
                }
                self.version = Some(value.clone());
            }
            "release" => {
                if value.contains('-') {
                    return Err(format!("line {}: Illegal char '-' in Release: {}", line_no, value));
                }
                self.release = Some(value.clone());
            }
            _ => {}
        }

        if main_package {
            self.macros.insert(tag, value);
        }
        Ok(())
    }

    fn declare(
        &mut self,
        kind: Kind,
        index: Option<u32>,
        value: String,
        line_no: usize,
    ) -> Result<(), String> {
        if value.is_empty() {
            return Err(format!("line {}: Empty {} tag", line_no, kind.label()));
        }

        let is_patch = kind == Kind::Patch;
        let index = match index {
            Some(index) => index,
            None => self.next_free_index(is_patch),
        };
        let reference = SourceReference {
            path: value.clone(),
            index,
            flags: kind.flags(),
        };
        self.macros
            .insert(format!("{}{}", kind.label().to_uppercase(), index), value);

        // every conditional branch is read, so the last declaration wins
        if !self.used.insert((index, is_patch)) {
            warn!(
                line = line_no,
                kind = kind.label(),
                index,
                path = %reference.path,
                "Declared more than once, using the last declaration"
            );
            if let Some(previous) = self
                .sources
                .iter_mut()
                .find(|s| s.index == index && s.flags.contains(SourceFlags::PATCH) == is_patch)
            {
                *previous = reference;
            }
            return Ok(());
        }

        trace!(kind = kind.label(), index, path = %reference.path, "Declared");
        self.sources.push(reference);
        Ok(())
    }

    fn next_free_index(&self, is_patch: bool) -> u32 {
        self.used
            .iter()
            .filter(|(_, patch)| *patch == is_patch)
            .map(|(index, _)| index + 1)
            .max()
            .unwrap_or(0)
    }

    fn expand(&self, input: &str, line_no: usize) -> Result<String, String> {
        expand_macros(input, &self.macros, 0).map_err(|e| format!("line {}: {}", line_no, e))
    }

    fn finish(mut self) -> Result<ParsedSpec, String> {
        let name = self
            .name
            .take()
            .ok_or_else(|| "Name field must be present in package".to_string())?;
        let version = self
            .version
            .take()
            .ok_or_else(|| "Version field must be present in package".to_string())?;
        let release = self
            .release
            .take()
            .ok_or_else(|| "Release field must be present in package".to_string())?;
        if !self.has_description {
            return Err(format!("Package has no %description: {}", name));
        }

        for reference in &mut self.sources {
            let excluded = if reference.flags.contains(SourceFlags::PATCH) {
                self.no_patch.contains(&reference.index)
            } else {
                self.no_source.contains(&reference.index)
            };
            if excluded {
                reference.flags = reference.flags.union(SourceFlags::NO);
            }
        }

        Ok(ParsedSpec {
            name,
            version,
            release,
            sources: self.sources,
        })
    }
}

fn parse_number(digits: &str, line_no: usize) -> Result<Option<u32>, String> {
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse::<u32>()
        .map(Some)
        .map_err(|_| format!("line {}: Invalid source number: {}", line_no, digits))
}

fn parse_number_list(value: &str, line_no: usize) -> Result<Vec<u32>, String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| format!("line {}: Bad number: {}", line_no, s))
        })
        .collect()
}

/// Expands `%name`, `%{name}`, `%{?name}`, `%{?name:text}`, `%{!?name:text}` and `%%`.
///
/// Undefined plain macros, shell `%(...)` and builtins such as `%{lua:...}` are left verbatim.
pub(crate) fn expand_macros(
    input: &str,
    macros: &BTreeMap<String, String>,
    depth: usize,
) -> Result<String, String> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(format!("Too many levels of recursion in macro expansion: {}", input));
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('%') {
            out.push('%');
            rest = tail;
        } else if let Some(braced) = after.strip_prefix('{') {
            let Some(end) = matching_brace(braced) else {
                out.push_str(&rest[pos..]);
                return Ok(out);
            };
            let inner = &braced[..end];
            match expand_braced(inner, macros, depth)? {
                Some(value) => out.push_str(&value),
                None => {
                    out.push_str("%{");
                    out.push_str(inner);
                    out.push('}');
                }
            }
            rest = &braced[end + 1..];
        } else {
            let ident_len = after
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            let ident = &after[..ident_len];
            match macros.get(ident) {
                Some(value) if !ident.is_empty() => {
                    out.push_str(&expand_macros(value, macros, depth + 1)?)
                }
                _ => {
                    out.push('%');
                    out.push_str(ident);
                }
            }
            rest = &after[ident_len..];
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn expand_braced(
    inner: &str,
    macros: &BTreeMap<String, String>,
    depth: usize,
) -> Result<Option<String>, String> {
    let (negate, conditional, body) = if let Some(body) = inner.strip_prefix("!?") {
        (true, true, body)
    } else if let Some(body) = inner.strip_prefix("?!") {
        (true, true, body)
    } else if let Some(body) = inner.strip_prefix('?') {
        (false, true, body)
    } else {
        (false, false, inner)
    };

    if !conditional {
        if body.contains(|c: char| c.is_whitespace() || c == ':') {
            return Ok(None);
        }
        return match macros.get(body) {
            Some(value) => expand_macros(value, macros, depth + 1).map(Some),
            None => Ok(None),
        };
    }

    let (name, text) = match body.split_once(':') {
        Some((name, text)) => (name, Some(text)),
        None => (body, None),
    };
    let defined = macros.contains_key(name);

    let expanded = match (defined != negate, text) {
        (false, _) => String::new(),
        (true, Some(text)) => expand_macros(text, macros, depth + 1)?,
        (true, None) if negate => String::new(),
        (true, None) => match macros.get(name) {
            Some(value) => expand_macros(value, macros, depth + 1)?,
            None => String::new(),
        },
    };
    Ok(Some(expanded))
}

fn matching_brace(s: &str) -> Option<usize> {
    let mut level = 1usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => level += 1,
            '}' => {
                level -= 1;
                if level == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
