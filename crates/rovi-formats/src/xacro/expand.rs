//! Macro, property and include expansion over the XML tree

use std::collections::HashMap;
use std::rc::Rc;

use rovi_assets::{FileBundle, resolver};

use super::eval::{self, EvalError, Value};
use crate::xml::{XmlChild, XmlError, XmlNode, parse_document};

/// A recorded `xacro:macro` definition.
#[derive(Debug, Clone)]
struct MacroDef {
    params: Vec<MacroParam>,
    body: Vec<XmlChild>,
}

#[derive(Debug, Clone)]
struct MacroParam {
    name: String,
    kind: ParamKind,
    default: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParamKind {
    /// Bound from an attribute on the call element.
    Value,
    /// `*name`: bound to the next element child of the call.
    Block,
    /// `**name`: bound to all remaining children of the call.
    Blocks,
}

fn parse_params(spec: &str) -> Vec<MacroParam> {
    spec.split_whitespace()
        .map(|raw| {
            let (kind, rest) = if let Some(r) = raw.strip_prefix("**") {
                (ParamKind::Blocks, r)
            } else if let Some(r) = raw.strip_prefix('*') {
                (ParamKind::Block, r)
            } else {
                (ParamKind::Value, raw)
            };
            let (name, default) = match rest.split_once(":=") {
                Some((n, d)) => (n.to_string(), Some(d.to_string())),
                None => (rest.to_string(), None),
            };
            MacroParam {
                name,
                kind,
                default,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Binding {
    Text(String),
    Block(XmlNode),
    Blocks(Vec<XmlChild>),
}

#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, Binding>,
    /// Macro frames hide caller locals; lookups fall through to globals.
    barrier: bool,
}

/// Walks a parsed document and produces the flat expansion.
pub(crate) struct Expander<'a> {
    bundle: &'a FileBundle,
    args: HashMap<String, String>,
    macros: HashMap<String, Rc<MacroDef>>,
    frames: Vec<Frame>,
    context_dirs: Vec<String>,
    include_stack: Vec<String>,
}

impl<'a> Expander<'a> {
    pub(crate) fn new(
        bundle: &'a FileBundle,
        context_dir: &str,
        args: HashMap<String, String>,
    ) -> Self {
        let mut globals = Frame::default();
        // Compatibility shim: legacy documents compare string-typed
        // arguments against capitalized True/False tokens, so those names
        // resolve to the lowercase spellings the arguments carry.
        globals
            .vars
            .insert("True".into(), Binding::Text("true".into()));
        globals
            .vars
            .insert("False".into(), Binding::Text("false".into()));
        globals.vars.insert(
            "pi".into(),
            Binding::Text(std::f64::consts::PI.to_string()),
        );
        Self {
            bundle,
            args,
            macros: HashMap::new(),
            frames: vec![globals],
            context_dirs: vec![context_dir.to_string()],
            include_stack: Vec::new(),
        }
    }

    /// Collect `xacro:arg` defaults anywhere in the tree, then make sure the
    /// conventional flags exist so conditionals referencing them evaluate.
    pub(crate) fn seed_args(&mut self, root: &XmlNode) {
        self.collect_arg_defaults(root);
        for flag in ["debug", "self_collision"] {
            self.args
                .entry(flag.to_string())
                .or_insert_with(|| "false".to_string());
        }
    }

    fn collect_arg_defaults(&mut self, node: &XmlNode) {
        if node.tag == "xacro:arg"
            && let (Some(name), Some(default)) = (node.attr("name"), node.attr("default"))
            && !self.args.contains_key(name)
        {
            self.args.insert(name.to_string(), default.to_string());
        }
        for child in node.elements() {
            self.collect_arg_defaults(child);
        }
    }

    /// Expand `root` into a flat element tree.
    pub(crate) fn expand(&mut self, root: &XmlNode) -> Result<XmlNode, XacroError> {
        let mut out = XmlNode::new(&root.tag);
        for (name, value) in &root.attrs {
            out.set_attr(name.as_str(), self.substitute(value)?);
        }
        let mut children = Vec::new();
        self.expand_children(&root.children, &mut children)?;
        out.children = children;
        Ok(out)
    }

    fn expand_children(
        &mut self,
        children: &[XmlChild],
        out: &mut Vec<XmlChild>,
    ) -> Result<(), XacroError> {
        for child in children {
            match child {
                XmlChild::Element(e) => self.expand_element(e, out)?,
                XmlChild::Text(t) => {
                    let text = self.substitute(t)?;
                    if !text.is_empty() {
                        out.push(XmlChild::Text(text));
                    }
                }
                XmlChild::Comment(_) => {}
            }
        }
        Ok(())
    }

    fn expand_element(
        &mut self,
        element: &XmlNode,
        out: &mut Vec<XmlChild>,
    ) -> Result<(), XacroError> {
        let Some(directive) = element.tag.strip_prefix("xacro:") else {
            out.push(XmlChild::Element(self.expand(element)?));
            return Ok(());
        };
        match directive {
            "property" => self.define_property(element),
            "macro" => self.define_macro(element),
            "arg" => self.declare_arg(element),
            "if" => self.conditional(element, out, true),
            "unless" => self.conditional(element, out, false),
            "include" => self.include(element, out),
            "insert_block" => self.insert_block(element, out),
            name => self.call_macro(name, element, out),
        }
    }

    fn define_property(&mut self, element: &XmlNode) -> Result<(), XacroError> {
        let name = require_attr(element, "name")?;
        let value = match element.attr("value") {
            Some(v) => self.substitute(v)?,
            None => String::new(),
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.to_string(), Binding::Text(value));
        }
        Ok(())
    }

    fn define_macro(&mut self, element: &XmlNode) -> Result<(), XacroError> {
        let name = require_attr(element, "name")?;
        let params = parse_params(element.attr("params").unwrap_or(""));
        self.macros.insert(
            name.to_string(),
            Rc::new(MacroDef {
                params,
                body: element.children.clone(),
            }),
        );
        Ok(())
    }

    fn declare_arg(&mut self, element: &XmlNode) -> Result<(), XacroError> {
        let name = require_attr(element, "name")?;
        if !self.args.contains_key(name)
            && let Some(default) = element.attr("default")
        {
            self.args.insert(name.to_string(), default.to_string());
        }
        Ok(())
    }

    fn conditional(
        &mut self,
        element: &XmlNode,
        out: &mut Vec<XmlChild>,
        keep_when: bool,
    ) -> Result<(), XacroError> {
        let raw = require_attr(element, "value")?;
        let substituted = self.substitute(raw)?;
        let condition = Value::from_text(&substituted)
            .as_bool()
            .map_err(|source| XacroError::Condition {
                value: substituted.clone(),
                source,
            })?;
        if condition == keep_when {
            self.expand_children(&element.children, out)?;
        }
        Ok(())
    }

    fn include(&mut self, element: &XmlNode, out: &mut Vec<XmlChild>) -> Result<(), XacroError> {
        let raw = require_attr(element, "filename")?;
        let filename = self.substitute(raw)?;
        let (key, text) = self
            .find_include(&filename)
            .ok_or_else(|| XacroError::IncludeNotFound(filename.clone()))?;
        if self.include_stack.contains(&key) {
            return Err(XacroError::IncludeCycle(key));
        }
        let document = parse_document(&text)?;
        self.include_stack.push(key.clone());
        self.context_dirs
            .push(resolver::parent_dir(&key).to_string());
        let result = self.expand_children(&document.children, out);
        self.context_dirs.pop();
        self.include_stack.pop();
        result
    }

    /// Literal path first, then relative to the including document, then a
    /// bundle-wide basename scan.
    fn find_include(&self, filename: &str) -> Option<(String, String)> {
        let normalized = resolver::normalize_reference(filename);
        if let Some(text) = self.bundle.text(&normalized) {
            return Some((normalized, text));
        }
        let context = self.context_dirs.last().map(String::as_str).unwrap_or("");
        if !context.is_empty() {
            let relative = resolver::normalize_reference(&format!("{context}/{normalized}"));
            if let Some(text) = self.bundle.text(&relative) {
                return Some((relative, text));
            }
        }
        let want = resolver::basename(&normalized);
        if want.is_empty() {
            return None;
        }
        for key in self.bundle.keys() {
            if resolver::basename(key).eq_ignore_ascii_case(want) {
                return Some((key.to_string(), self.bundle.text(key)?));
            }
        }
        None
    }

    fn insert_block(
        &mut self,
        element: &XmlNode,
        out: &mut Vec<XmlChild>,
    ) -> Result<(), XacroError> {
        let name = require_attr(element, "name")?;
        let binding = self
            .lookup(name)
            .cloned()
            .ok_or_else(|| XacroError::UnknownBlock(name.to_string()))?;
        match binding {
            Binding::Block(node) => self.expand_element(&node, out),
            Binding::Blocks(children) => self.expand_children(&children, out),
            Binding::Text(_) => Err(XacroError::UnknownBlock(name.to_string())),
        }
    }

    fn call_macro(
        &mut self,
        name: &str,
        call: &XmlNode,
        out: &mut Vec<XmlChild>,
    ) -> Result<(), XacroError> {
        let def = self
            .macros
            .get(name)
            .cloned()
            .ok_or_else(|| XacroError::UnknownMacro(name.to_string()))?;
        let mut frame = Frame {
            barrier: true,
            ..Frame::default()
        };
        let mut blocks = call
            .children
            .iter()
            .filter(|c| matches!(c, XmlChild::Element(_)));

        for param in &def.params {
            let binding = match param.kind {
                ParamKind::Value => {
                    let text = match call.attr(&param.name) {
                        Some(raw) => self.substitute(raw)?,
                        None => self.default_value(name, param)?,
                    };
                    Binding::Text(text)
                }
                ParamKind::Block => {
                    let Some(XmlChild::Element(node)) = blocks.next() else {
                        return Err(XacroError::MissingMacroArg {
                            macro_name: name.to_string(),
                            param: param.name.clone(),
                        });
                    };
                    Binding::Block(node.clone())
                }
                ParamKind::Blocks => Binding::Blocks(blocks.by_ref().cloned().collect()),
            };
            frame.vars.insert(param.name.clone(), binding);
        }

        self.frames.push(frame);
        let result = self.expand_children(&def.body, out);
        self.frames.pop();
        result
    }

    /// A `:=^` default inherits the property of the same name from the call
    /// site; `:=^|fallback` falls back when nothing is in scope.
    fn default_value(&self, macro_name: &str, param: &MacroParam) -> Result<String, XacroError> {
        let missing = || XacroError::MissingMacroArg {
            macro_name: macro_name.to_string(),
            param: param.name.clone(),
        };
        let Some(default) = &param.default else {
            return Err(missing());
        };
        if let Some(rest) = default.strip_prefix('^') {
            if let Some(Binding::Text(text)) = self.lookup(&param.name) {
                return Ok(text.clone());
            }
            if let Some(fallback) = rest.strip_prefix('|') {
                return self.substitute(fallback);
            }
            return Err(missing());
        }
        self.substitute(default)
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        for (index, frame) in self.frames.iter().enumerate().rev() {
            if let Some(binding) = frame.vars.get(name) {
                return Some(binding);
            }
            if frame.barrier && index > 0 {
                return self.frames[0].vars.get(name);
            }
        }
        None
    }

    /// Replace `${expr}` and `$(command ...)` occurrences. `$$` escapes a
    /// literal dollar.
    fn substitute(&self, input: &str) -> Result<String, XacroError> {
        self.substitute_inner(input, true)
    }

    fn substitute_inner(&self, input: &str, expressions: bool) -> Result<String, XacroError> {
        if !input.contains('$') {
            return Ok(input.to_string());
        }
        let chars: Vec<char> = input.chars().collect();
        let mut output = String::with_capacity(input.len());
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != '$' {
                output.push(chars[i]);
                i += 1;
                continue;
            }
            match chars.get(i + 1) {
                Some('$') => {
                    output.push('$');
                    i += 2;
                }
                Some('{') if expressions => {
                    let end = find_closing(&chars, i + 2, '}')
                        .ok_or_else(|| XacroError::Unterminated(input.to_string()))?;
                    let raw: String = chars[i + 2..end].iter().collect();
                    // Resolve nested $(arg ...) before the expression parse.
                    let expr = self.substitute_inner(&raw, false)?;
                    let value = eval::eval(&expr, &ScopeView(self)).map_err(|source| {
                        XacroError::Expression {
                            expr: expr.clone(),
                            source,
                        }
                    })?;
                    output.push_str(&value.to_string());
                    i = end + 1;
                }
                Some('(') => {
                    let end = find_closing(&chars, i + 2, ')')
                        .ok_or_else(|| XacroError::Unterminated(input.to_string()))?;
                    let call: String = chars[i + 2..end].iter().collect();
                    output.push_str(&self.substitution_command(call.trim())?);
                    i = end + 1;
                }
                _ => {
                    output.push('$');
                    i += 1;
                }
            }
        }
        Ok(output)
    }

    fn substitution_command(&self, call: &str) -> Result<String, XacroError> {
        let (command, rest) = call.split_once(char::is_whitespace).unwrap_or((call, ""));
        let argument = rest.trim();
        match command {
            "arg" => self
                .args
                .get(argument)
                .cloned()
                .ok_or_else(|| XacroError::UndefinedArg(argument.to_string())),
            "find" => Ok(format!("package://{argument}")),
            other => Err(XacroError::UnknownCommand(other.to_string())),
        }
    }
}

/// Property lookup view handed to the expression evaluator.
struct ScopeView<'e, 'a>(&'e Expander<'a>);

impl eval::Lookup for ScopeView<'_, '_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        match self.0.lookup(name)? {
            Binding::Text(text) => Some(Value::from_text(text)),
            _ => None,
        }
    }
}

fn require_attr<'n>(element: &'n XmlNode, name: &str) -> Result<&'n str, XacroError> {
    element.attr(name).ok_or_else(|| XacroError::MissingAttr {
        tag: element.tag.clone(),
        attr: name.to_string(),
    })
}

/// Scan for `close` at quote-depth zero.
fn find_closing(chars: &[char], start: usize, close: char) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, &c) in chars[start..].iter().enumerate() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == close => return Some(start + offset),
            None => {}
        }
    }
    None
}

// ============== Errors ==============

/// Expansion failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum XacroError {
    #[error("invalid xml: {0}")]
    Xml(#[from] XmlError),
    #[error("missing attribute '{attr}' on <{tag}>")]
    MissingAttr { tag: String, attr: String },
    #[error("cannot evaluate '{expr}': {source}")]
    Expression { expr: String, source: EvalError },
    #[error("'{value}' is not a truth value: {source}")]
    Condition { value: String, source: EvalError },
    #[error("include '{0}' not found in bundle")]
    IncludeNotFound(String),
    #[error("include cycle through '{0}'")]
    IncludeCycle(String),
    #[error("unknown macro or directive 'xacro:{0}'")]
    UnknownMacro(String),
    #[error("no block named '{0}' in scope")]
    UnknownBlock(String),
    #[error("macro '{macro_name}' is missing argument '{param}'")]
    MissingMacroArg { macro_name: String, param: String },
    #[error("unknown substitution command '$({0} ...)'")]
    UnknownCommand(String),
    #[error("undefined argument '{0}'")]
    UndefinedArg(String),
    #[error("unterminated substitution in '{0}'")]
    Unterminated(String),
}
