use std::io::Write;

use anyhow::*;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::entity::Registry;

/// An opaque reference to an element owned by a [`GroupsXml`] builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XmlHandle(usize);

/// What the merger needs to describe the HOGs it builds as XML groups.
///
/// Groups are created parentless and stay top-level groups until they are
/// appended to another one.
pub trait GroupsXml {
    /// Create a new element, appended to `parent` if there is one.
    fn create_element(&mut self, parent: Option<XmlHandle>, tag: &str) -> XmlHandle;
    fn set_attribute(&mut self, element: XmlHandle, name: &str, value: &str);
    /// Move `child` (and its subtree) under `parent`, detaching it from its
    /// previous parent if any.
    fn append_child(&mut self, parent: XmlHandle, child: XmlHandle);
}

#[derive(Debug)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlHandle>,
    parent: Option<XmlHandle>,
}

pub const GROUP_TAG: &str = "orthologGroup";

/// An in-memory orthoXML groups forest.
#[derive(Debug, Default)]
pub struct OrthoXml {
    elements: Vec<Element>,
}

impl OrthoXml {
    pub fn new() -> Self {
        Self::default()
    }

    /// The groups not nested in any other, in creation order.
    pub fn top_level_groups(&self) -> impl Iterator<Item = XmlHandle> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.parent.is_none() && e.tag == GROUP_TAG)
            .map(|(i, _)| XmlHandle(i))
    }

    #[cfg(test)]
    pub fn tag(&self, e: XmlHandle) -> &str {
        &self.elements[e.0].tag
    }

    #[cfg(test)]
    pub fn attribute(&self, e: XmlHandle, name: &str) -> Option<&str> {
        self.elements[e.0].attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    pub fn children(&self, e: XmlHandle) -> &[XmlHandle] {
        &self.elements[e.0].children
    }

    #[cfg(test)]
    pub fn parent(&self, e: XmlHandle) -> Option<XmlHandle> {
        self.elements[e.0].parent
    }

    fn write_element<W: Write>(&self, w: &mut Writer<W>, e: XmlHandle) -> Result<()> {
        let element = &self.elements[e.0];
        let mut start = BytesStart::new(element.tag.as_str());
        for (k, v) in element.attributes.iter() {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if element.children.is_empty() {
            w.write_event(Event::Empty(start))?;
        } else {
            w.write_event(Event::Start(start))?;
            for &c in element.children.iter() {
                self.write_element(w, c)?;
            }
            w.write_event(Event::End(BytesEnd::new(element.tag.as_str())))?;
        }
        Ok(())
    }

    /// Write a complete orthoXML document: the extant genomes of `registry`
    /// and their genes, followed by the groups.
    pub fn write_orthoxml<W: Write>(&self, registry: &Registry, out: W) -> Result<()> {
        let mut w = Writer::new_with_indent(out, b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("orthoXML");
        root.push_attribute(("xmlns", "http://orthoXML.org/2011/"));
        root.push_attribute(("version", "0.3"));
        root.push_attribute(("origin", env!("CARGO_PKG_NAME")));
        root.push_attribute(("originVersion", env!("CARGO_PKG_VERSION")));
        w.write_event(Event::Start(root))?;

        for (_, genome) in registry.genomes().filter(|(_, g)| g.is_extant()) {
            let mut species = BytesStart::new("species");
            species.push_attribute(("name", genome.taxon.as_str()));
            species.push_attribute(("NCBITaxId", "0"));
            w.write_event(Event::Start(species))?;

            let mut db = BytesStart::new("database");
            db.push_attribute(("name", "unknown"));
            db.push_attribute(("version", "0"));
            w.write_event(Event::Start(db))?;
            w.write_event(Event::Start(BytesStart::new("genes")))?;
            for gene in genome.gene_ids().into_iter().map(|g| registry.gene(g)) {
                let mut g = BytesStart::new("gene");
                g.push_attribute(("id", gene.id.to_string().as_str()));
                g.push_attribute(("protId", gene.ext_id.to_string().as_str()));
                w.write_event(Event::Empty(g))?;
            }
            w.write_event(Event::End(BytesEnd::new("genes")))?;
            w.write_event(Event::End(BytesEnd::new("database")))?;
            w.write_event(Event::End(BytesEnd::new("species")))?;
        }

        let groups = self.top_level_groups().collect::<Vec<_>>();
        if groups.is_empty() {
            w.write_event(Event::Empty(BytesStart::new("groups")))?;
        } else {
            w.write_event(Event::Start(BytesStart::new("groups")))?;
            for group in groups {
                self.write_element(&mut w, group)?;
            }
            w.write_event(Event::End(BytesEnd::new("groups")))?;
        }
        w.write_event(Event::End(BytesEnd::new("orthoXML")))?;
        w.into_inner().flush()?;
        Ok(())
    }
}

impl GroupsXml for OrthoXml {
    fn create_element(&mut self, parent: Option<XmlHandle>, tag: &str) -> XmlHandle {
        let id = XmlHandle(self.elements.len());
        self.elements.push(Element {
            tag: tag.to_owned(),
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
        });
        if let Some(parent) = parent {
            self.append_child(parent, id);
        }
        id
    }

    fn set_attribute(&mut self, element: XmlHandle, name: &str, value: &str) {
        let attributes = &mut self.elements[element.0].attributes;
        if let Some(a) = attributes.iter_mut().find(|(k, _)| k == name) {
            a.1 = value.to_owned();
        } else {
            attributes.push((name.to_owned(), value.to_owned()));
        }
    }

    fn append_child(&mut self, parent: XmlHandle, child: XmlHandle) {
        if let Some(old) = self.elements[child.0].parent.take() {
            self.elements[old.0].children.retain(|&c| c != child);
        }
        self.elements[parent.0].children.push(child);
        self.elements[child.0].parent = Some(parent);
    }
}
