//! Rendered output of a sandbox and the surface it is painted on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex};

use crate::bridge::Generation;
use crate::error::FailureKind;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum RenderNode {
    Empty,
    Text {
        text: String,
    },
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<RenderNode>,
    },
    Fragment {
        children: Vec<RenderNode>,
    },
}

impl RenderNode {
    pub fn text(text: impl Into<String>) -> Self {
        RenderNode::Text { text: text.into() }
    }

    pub fn element(tag: impl Into<String>, children: Vec<RenderNode>) -> Self {
        RenderNode::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children,
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            RenderNode::Empty => {}
            RenderNode::Text { text } => out.push_str(&escape_html(text)),
            RenderNode::Element { tag, attrs, children } => {
                let _ = write!(out, "<{}", tag);
                for (name, value) in attrs {
                    if value.is_empty() {
                        let _ = write!(out, " {}", name);
                    } else {
                        let _ = write!(out, " {}=\"{}\"", name, escape_html(value));
                    }
                }
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{}>", tag);
            }
            RenderNode::Fragment { children } => {
                for child in children {
                    child.write_html(out);
                }
            }
        }
    }

    /// Concatenated text of the subtree, without markup.
    pub fn text_content(&self) -> String {
        match self {
            RenderNode::Empty => String::new(),
            RenderNode::Text { text } => text.clone(),
            RenderNode::Element { children, .. } | RenderNode::Fragment { children } => {
                children.iter().map(RenderNode::text_content).collect()
            }
        }
    }

    /// Every element with `tag` in document order.
    pub fn find_all(&self, tag: &str) -> Vec<&RenderNode> {
        let mut out = Vec::new();
        self.collect_tag(tag, &mut out);
        out
    }

    fn collect_tag<'a>(&'a self, wanted: &str, out: &mut Vec<&'a RenderNode>) {
        match self {
            RenderNode::Element { tag, children, .. } => {
                if tag == wanted {
                    out.push(self);
                }
                for child in children {
                    child.collect_tag(wanted, out);
                }
            }
            RenderNode::Fragment { children } => {
                for child in children {
                    child.collect_tag(wanted, out);
                }
            }
            _ => {}
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            RenderNode::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            _ => None,
        }
    }
}

/// One complete paint of the sandbox surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "camelCase")]
pub enum Frame {
    #[serde(rename_all = "camelCase")]
    Component {
        generation: Generation,
        stylesheet: String,
        root: RenderNode,
    },
    /// Shown where the component would have been.
    ErrorPanel {
        generation: Generation,
        kind: FailureKind,
        message: String,
    },
}

impl Frame {
    pub fn generation(&self) -> Generation {
        match self {
            Frame::Component { generation, .. } | Frame::ErrorPanel { generation, .. } => *generation,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::ErrorPanel { .. })
    }

    pub fn root(&self) -> Option<&RenderNode> {
        match self {
            Frame::Component { root, .. } => Some(root),
            Frame::ErrorPanel { .. } => None,
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            Frame::Component { stylesheet, root, .. } => {
                let mut out = String::new();
                if !stylesheet.trim().is_empty() {
                    let _ = write!(out, "<style>{}</style>", stylesheet);
                }
                out.push_str(&root.to_html());
                out
            }
            Frame::ErrorPanel { kind, message, .. } => format!(
                "<div class=\"widget-sandbox-error\" role=\"alert\"><strong>{}</strong><pre>{}</pre></div>",
                escape_html(kind.title()),
                escape_html(message)
            ),
        }
    }
}

/// Where a sandbox paints. Called from the sandbox worker thread.
pub trait Surface: Send + Sync {
    fn paint(&self, frame: Frame);
}

/// Surface that keeps every frame, for tests and the preview CLI.
#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Frame> {
        self.frames.lock().ok().and_then(|f| f.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Surface for FrameRecorder {
    fn paint(&self, frame: Frame) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame);
        }
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, attrs: &[(&str, &str)], children: Vec<RenderNode>) -> RenderNode {
        RenderNode::Element {
            tag: tag.into(),
            attrs: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            children,
        }
    }

    #[test]
    fn test_html_escapes_text_and_attrs() {
        let node = element(
            "span",
            &[("class", "a\"b"), ("hidden", "")],
            vec![RenderNode::text("1 < 2 & 3")],
        );
        assert_eq!(
            node.to_html(),
            "<span class=\"a&quot;b\" hidden>1 &lt; 2 &amp; 3</span>"
        );
    }

    #[test]
    fn test_void_elements_self_close() {
        let node = RenderNode::Fragment {
            children: vec![element("br", &[], vec![]), element("img", &[("src", "x.png")], vec![])],
        };
        assert_eq!(node.to_html(), "<br /><img src=\"x.png\" />");
    }

    #[test]
    fn test_text_content_and_find_all() {
        let node = element(
            "ul",
            &[],
            vec![
                element("li", &[("data-guid", "g1")], vec![RenderNode::text("a")]),
                RenderNode::Empty,
                element("li", &[], vec![RenderNode::text("b")]),
            ],
        );
        assert_eq!(node.text_content(), "ab");
        let items = node.find_all("li");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].attr("data-guid"), Some("g1"));
    }

    #[test]
    fn test_frame_html() {
        let frame = Frame::Component {
            generation: Generation::ZERO,
            stylesheet: ".a{color:red}".into(),
            root: RenderNode::element("p", vec![RenderNode::text("hi")]),
        };
        assert_eq!(frame.to_html(), "<style>.a{color:red}</style><p>hi</p>");

        let panel = Frame::ErrorPanel {
            generation: Generation::ZERO,
            kind: FailureKind::ComponentNotFound,
            message: "Foo <missing>".into(),
        };
        assert!(panel.is_error());
        assert!(panel.to_html().contains("Component not found"));
        assert!(panel.to_html().contains("Foo &lt;missing&gt;"));
    }

    #[test]
    fn test_recorder_keeps_order() {
        let recorder = FrameRecorder::new();
        let surface: Arc<dyn Surface> = Arc::new(recorder.clone());
        surface.paint(Frame::Component {
            generation: Generation::ZERO,
            stylesheet: String::new(),
            root: RenderNode::Empty,
        });
        surface.paint(Frame::ErrorPanel {
            generation: Generation::ZERO.next(),
            kind: FailureKind::Render,
            message: "boom".into(),
        });
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.last().unwrap().generation(), Generation::ZERO.next());
    }
}
