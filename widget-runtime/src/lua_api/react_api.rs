//! `React` / `ReactDOM` shims: element construction and element → [`RenderNode`].

use mlua::{Function, Lua, MultiValue, Result, Table, Value, Variadic};
use std::collections::BTreeMap;

use super::context::{context_mut, paint};
use super::hooks;
use crate::render::RenderNode;

const ELEMENT_MARKER: &str = "__element";
const FRAGMENT_MARKER: &str = "__fragment";

/// Nested components deeper than this are treated as runaway recursion.
pub const MAX_RENDER_DEPTH: usize = 200;

const COMPONENT_HELPERS: &str = r#"
local function callable(v)
    if type(v) == "function" then return true end
    local mt = getmetatable(v)
    return type(mt) == "table" and rawget(mt, "__call") ~= nil
end
local function invoke(f, ...)
    return f(...)
end
return callable, invoke
"#;

/// Register `React`, `ReactDOM` and the `h` alias of `React.createElement`.
pub fn register(lua: &Lua) -> Result<()> {
    let (callable, invoke): (Function, Function) = lua
        .load(COMPONENT_HELPERS)
        .set_name("=component-helpers")
        .eval()?;
    lua.set_named_registry_value("widget.callable", callable)?;
    lua.set_named_registry_value("widget.invoke", invoke)?;

    let react = lua.create_table()?;

    let fragment = lua.create_table()?;
    fragment.set(FRAGMENT_MARKER, true)?;
    react.set("Fragment", fragment)?;

    // React.createElement(type, props, ...children) -> element
    let create_element = lua.create_function(
        |lua, (kind, props, children): (Value, Option<Table>, Variadic<Value>)| {
            let element = lua.create_table()?;
            element.set(ELEMENT_MARKER, true)?;
            element.set("type", kind)?;

            let copied = lua.create_table()?;
            if let Some(src) = props {
                for pair in src.pairs::<Value, Value>() {
                    let (k, v) = pair?;
                    copied.raw_set(k, v)?;
                }
            }
            let mut children: Vec<Value> = children.iter().filter(|c| !c.is_nil()).cloned().collect();
            match children.len() {
                0 => {}
                1 => copied.raw_set("children", children.remove(0))?,
                _ => copied.raw_set("children", lua.create_sequence_from(children)?)?,
            }
            element.set("key", copied.raw_get::<Value>("key")?)?;
            element.set("props", copied)?;
            Ok(element)
        },
    )?;
    react.set("createElement", create_element.clone())?;

    // memo / forwardRef only matter for reconciliation; the component itself is returned
    let passthrough = lua.create_function(|_, component: Value| Ok(component))?;
    react.set("memo", passthrough.clone())?;
    react.set("forwardRef", passthrough)?;

    hooks::register(lua, &react)?;

    let react_dom = lua.create_table()?;

    // ReactDOM.render(element, container?)
    react_dom.set(
        "render",
        lua.create_function(|lua, args: MultiValue| {
            let element = args.into_iter().next().unwrap_or(Value::Nil);
            render_root(lua, element)
        })?,
    )?;

    // ReactDOM.createRoot(container) -> { render(element), unmount() }
    react_dom.set(
        "createRoot",
        lua.create_function(|lua, _: MultiValue| {
            let root = lua.create_table()?;
            root.set(
                "render",
                lua.create_function(|lua, args: MultiValue| {
                    let element = args.into_iter().last().unwrap_or(Value::Nil);
                    render_root(lua, element)
                })?,
            )?;
            root.set(
                "unmount",
                lua.create_function(|lua, _: MultiValue| paint(lua, RenderNode::Empty))?,
            )?;
            Ok(root)
        })?,
    )?;

    let globals = lua.globals();
    globals.set("React", react)?;
    globals.set("ReactDOM", react_dom)?;
    globals.set("h", create_element)?;
    Ok(())
}

fn render_root(lua: &Lua, element: Value) -> Result<()> {
    context_mut(lua)?.hooks.begin_render();
    let node = render_value(lua, element, 0)?;
    paint(lua, node)?;
    hooks::run_effects(lua)
}

/// Function, callable table, or table with a `render(props)` function.
pub fn is_component(lua: &Lua, value: &Value) -> Result<bool> {
    match value {
        Value::Function(_) => Ok(true),
        Value::Table(t) => {
            let callable: Function = lua.named_registry_value("widget.callable")?;
            if callable.call::<bool>(t.clone())? {
                return Ok(true);
            }
            Ok(matches!(t.get::<Value>("render")?, Value::Function(_)))
        }
        _ => Ok(false),
    }
}

pub fn call_component(lua: &Lua, component: &Value, props: Table) -> Result<Value> {
    match component {
        Value::Function(f) => f.call(props),
        Value::Table(t) => {
            let callable: Function = lua.named_registry_value("widget.callable")?;
            if callable.call::<bool>(t.clone())? {
                let invoke: Function = lua.named_registry_value("widget.invoke")?;
                return invoke.call((t.clone(), props));
            }
            let render: Function = t.get("render")?;
            render.call(props)
        }
        _ => Err(mlua::Error::runtime("value is not a component")),
    }
}

/// One render pass of a top-level component.
pub fn render_component(lua: &Lua, component: &Value, props: Table) -> Result<RenderNode> {
    context_mut(lua)?.hooks.begin_render();
    let output = call_component(lua, component, props)?;
    render_value(lua, output, 1)
}

pub fn render_value(lua: &Lua, value: Value, depth: usize) -> Result<RenderNode> {
    if depth > MAX_RENDER_DEPTH {
        return Err(mlua::Error::runtime(format!(
            "component tree deeper than {} levels",
            MAX_RENDER_DEPTH
        )));
    }
    match value {
        Value::Nil | Value::Boolean(_) => Ok(RenderNode::Empty),
        Value::String(s) => Ok(RenderNode::text(s.to_string_lossy())),
        Value::Integer(i) => Ok(RenderNode::text(i.to_string())),
        Value::Number(n) => Ok(RenderNode::text(format_number(n))),
        Value::Table(t) => {
            if t.raw_get::<Option<bool>>(ELEMENT_MARKER)?.unwrap_or(false) {
                render_element(lua, t, depth)
            } else {
                let mut children = Vec::new();
                for child in t.sequence_values::<Value>() {
                    push_child(&mut children, render_value(lua, child?, depth + 1)?);
                }
                Ok(RenderNode::Fragment { children })
            }
        }
        _ => Ok(RenderNode::Empty),
    }
}

fn render_element(lua: &Lua, element: Table, depth: usize) -> Result<RenderNode> {
    let kind: Value = element.raw_get("type")?;
    let props: Table = element.raw_get("props")?;

    match kind {
        Value::String(tag) => {
            let children = render_children(lua, &props, depth)?;
            Ok(RenderNode::Element {
                tag: tag.to_string_lossy(),
                attrs: attributes(&props)?,
                children,
            })
        }
        Value::Table(ref t) if t.raw_get::<Option<bool>>(FRAGMENT_MARKER)?.unwrap_or(false) => {
            Ok(RenderNode::Fragment {
                children: render_children(lua, &props, depth)?,
            })
        }
        other if is_component(lua, &other)? => {
            let output = call_component(lua, &other, props)?;
            render_value(lua, output, depth + 1)
        }
        other => Err(mlua::Error::runtime(format!(
            "invalid element type: {}",
            other.type_name()
        ))),
    }
}

fn render_children(lua: &Lua, props: &Table, depth: usize) -> Result<Vec<RenderNode>> {
    let mut children = Vec::new();
    let value: Value = props.raw_get("children")?;
    push_child(&mut children, render_value(lua, value, depth + 1)?);
    Ok(children)
}

/// Fragments are flattened into their parent; empty nodes are dropped.
fn push_child(children: &mut Vec<RenderNode>, node: RenderNode) {
    match node {
        RenderNode::Empty => {}
        RenderNode::Fragment { children: inner } => children.extend(inner),
        other => children.push(other),
    }
}

fn attributes(props: &Table) -> Result<BTreeMap<String, String>> {
    let mut attrs = BTreeMap::new();
    for pair in props.pairs::<Value, Value>() {
        let (k, v) = pair?;
        let name = match k {
            Value::String(s) => s.to_string_lossy(),
            _ => continue,
        };
        if matches!(name.as_str(), "children" | "key" | "ref") {
            continue;
        }
        let name = match name.as_str() {
            "className" => "class".to_string(),
            "htmlFor" => "for".to_string(),
            _ => name,
        };
        let rendered = match v {
            Value::Boolean(true) => String::new(),
            Value::String(s) => s.to_string_lossy(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => format_number(n),
            Value::Table(t) if name == "style" => style_to_css(&t)?,
            // handlers, false, nested tables
            _ => continue,
        };
        attrs.insert(name, rendered);
    }
    Ok(attrs)
}

fn style_to_css(style: &Table) -> Result<String> {
    let mut rules = BTreeMap::new();
    for pair in style.pairs::<String, Value>() {
        let (k, v) = pair?;
        let value = match v {
            Value::String(s) => s.to_string_lossy(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => format_number(n),
            _ => continue,
        };
        rules.insert(kebab_case(&k), value);
    }
    Ok(rules
        .into_iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join(";"))
}

fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("backgroundColor"), "background-color");
        assert_eq!(kebab_case("width"), "width");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
    }
}
