//! vim25 SOAP codec: request envelopes and a small XML tree reader that
//! turns response bodies into [`PropertyValue`]s.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{InventoryError, InventoryResult};
use crate::types::{AboutInfo, ObjectKind, ObjectReference, PropertyRecord, PropertyValue, ServiceContent};

pub const VIM_NAMESPACE: &str = "urn:vim25";
pub const SOAP_ACTION: &str = "urn:vim25/6.0";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Request building
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wrap a body fragment in a SOAP 1.1 envelope.
pub fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<soapenv:Body>{body}</soapenv:Body>
</soapenv:Envelope>"#
    )
}

fn moref(tag: &str, r: &ObjectReference) -> String {
    format!(
        r#"<{tag} type="{}">{}</{tag}>"#,
        r.kind.moref_type(),
        xml_escape(&r.id)
    )
}

fn call(method: &str, this: &ObjectReference, args: &str) -> String {
    envelope(&format!(
        r#"<{method} xmlns="{VIM_NAMESPACE}">{}{args}</{method}>"#,
        moref("_this", this)
    ))
}

pub fn retrieve_service_content() -> String {
    let this = ObjectReference::new(ObjectKind::ServiceInstance, "ServiceInstance");
    call("RetrieveServiceContent", &this, "")
}

pub fn login(session_manager: &ObjectReference, username: &str, password: &str) -> String {
    call(
        "Login",
        session_manager,
        &format!(
            "<userName>{}</userName><password>{}</password>",
            xml_escape(username),
            xml_escape(password)
        ),
    )
}

pub fn logout(session_manager: &ObjectReference) -> String {
    call("Logout", session_manager, "")
}

pub fn create_container_view(
    view_manager: &ObjectReference,
    container: &ObjectReference,
    kinds: &[ObjectKind],
    recursive: bool,
) -> String {
    let mut args = moref("container", container);
    for kind in kinds {
        args.push_str(&format!("<type>{}</type>", kind.vim_type()));
    }
    args.push_str(&format!("<recursive>{recursive}</recursive>"));
    call("CreateContainerView", view_manager, &args)
}

pub fn destroy_view(view: &ObjectReference) -> String {
    call("DestroyView", view, "")
}

pub fn retrieve_properties_ex(
    collector: &ObjectReference,
    kind: ObjectKind,
    objects: &[ObjectReference],
    properties: &[String],
) -> String {
    let mut spec = format!("<propSet><type>{}</type><all>false</all>", kind.vim_type());
    for path in properties {
        spec.push_str(&format!("<pathSet>{}</pathSet>", xml_escape(path)));
    }
    spec.push_str("</propSet>");
    for obj in objects {
        spec.push_str(&format!(
            "<objectSet>{}<skip>false</skip></objectSet>",
            moref("obj", obj)
        ));
    }
    call(
        "RetrievePropertiesEx",
        collector,
        &format!("<specSet>{spec}</specSet><options></options>"),
    )
}

pub fn continue_retrieve_properties_ex(collector: &ObjectReference, token: &str) -> String {
    call(
        "ContinueRetrievePropertiesEx",
        collector,
        &format!("<token>{}</token>", xml_escape(token)),
    )
}

pub fn acquire_clone_ticket(session_manager: &ObjectReference) -> String {
    call("AcquireCloneTicket", session_manager, "")
}

/// Escape the five XML special characters.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  XML tree
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One element of a parsed response.
///
/// `name` is the local name. Attribute keys keep their prefix, because a
/// bare `type` marks a managed-object reference while `xsi:type` marks
/// the value's schema type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn from_start(e: &BytesStart<'_>) -> InventoryResult<Self> {
        let mut node = Self::named(&String::from_utf8_lossy(e.local_name().as_ref()));
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attrs.push((key, value));
        }
        Ok(node)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The schema type from `xsi:type` (any prefix), without its own prefix.
    pub fn schema_type(&self) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.ends_with(":type"))
            .map(|(_, v)| v.rsplit(':').next().unwrap_or(v))
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// First descendant (depth-first, self included) with this name.
    pub fn find(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

/// Parse a whole document into a tree rooted at a synthetic node.
pub fn parse_document(xml: &str) -> InventoryResult<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = vec![XmlNode::named("#document")];
    loop {
        match reader.read_event()? {
            Event::Start(ref e) => stack.push(XmlNode::from_start(e)?),
            Event::Empty(ref e) => {
                let node = XmlNode::from_start(e)?;
                top(&mut stack)?.children.push(node);
            }
            Event::Text(ref t) => {
                let text = t.unescape()?;
                top(&mut stack)?.text.push_str(&text);
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                top(&mut stack)?.text.push_str(&text);
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| InventoryError::parse("unbalanced closing tag"))?;
                if stack.is_empty() {
                    return Err(InventoryError::parse("unbalanced closing tag"));
                }
                top(&mut stack)?.children.push(node);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if stack.len() != 1 {
        return Err(InventoryError::parse(format!(
            "document ended with {} unclosed element(s)",
            stack.len() - 1
        )));
    }
    stack
        .pop()
        .ok_or_else(|| InventoryError::parse("empty document"))
}

fn top(stack: &mut [XmlNode]) -> InventoryResult<&mut XmlNode> {
    stack
        .last_mut()
        .ok_or_else(|| InventoryError::parse("text outside of any element"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Response decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a response envelope and return the `*Response` element.
/// Faults become errors.
pub fn decode(xml: &str) -> InventoryResult<XmlNode> {
    let doc = parse_document(xml)?;
    let body = doc
        .child("Envelope")
        .and_then(|env| env.child("Body"))
        .ok_or_else(|| InventoryError::parse("response has no SOAP body"))?;
    if let Some(fault) = body.child("Fault") {
        return Err(fault_error(fault));
    }
    body.children
        .first()
        .cloned()
        .ok_or_else(|| InventoryError::parse("empty SOAP body"))
}

/// Map a `<Fault>` element onto the error taxonomy.
pub fn fault_error(fault: &XmlNode) -> InventoryError {
    let reason = fault
        .child_text("faultstring")
        .filter(|s| !s.is_empty())
        .unwrap_or("unspecified fault")
        .to_string();
    let detail = fault
        .child("detail")
        .and_then(|d| d.children.first())
        .map(|d| d.schema_type().unwrap_or(&d.name).to_string())
        .unwrap_or_default();
    let detail = detail.trim_end_matches("Fault");
    match detail {
        "InvalidLogin" | "NotAuthenticated" => InventoryError::auth(format!("{detail}: {reason}")),
        "" => InventoryError::soap_fault(reason),
        _ => InventoryError::soap_fault(format!("{detail}: {reason}")),
    }
}

/// Read a managed-object reference element.
pub fn moref_of(node: &XmlNode) -> InventoryResult<ObjectReference> {
    let vim_type = node
        .attr("type")
        .ok_or_else(|| InventoryError::parse(format!("<{}> is not a reference", node.name)))?;
    let kind = ObjectKind::from_vim_type(vim_type)
        .ok_or_else(|| InventoryError::parse(format!("unknown object type '{vim_type}'")))?;
    Ok(ObjectReference::new(kind, node.text.clone()))
}

/// Convert an element into a dynamic value.
pub fn node_value(node: &XmlNode) -> PropertyValue {
    if let Some(vim_type) = node.attr("type") {
        return match ObjectKind::from_vim_type(vim_type) {
            Some(kind) => PropertyValue::Reference(ObjectReference::new(kind, node.text.clone())),
            None => PropertyValue::ForeignReference {
                vim_type: vim_type.to_string(),
                id: node.text.clone(),
            },
        };
    }
    let schema = node.schema_type().unwrap_or("");
    if schema.starts_with("ArrayOf") {
        return PropertyValue::List(node.children.iter().map(node_value).collect());
    }
    if !node.children.is_empty() {
        let mut grouped: BTreeMap<String, Vec<PropertyValue>> = BTreeMap::new();
        for child in &node.children {
            grouped
                .entry(child.name.clone())
                .or_default()
                .push(node_value(child));
        }
        let fields = grouped
            .into_iter()
            .map(|(name, mut values)| {
                let value = if values.len() == 1 {
                    values.remove(0)
                } else {
                    PropertyValue::List(values)
                };
                (name, value)
            })
            .collect();
        return PropertyValue::Object(fields);
    }
    leaf_value(schema, &node.text)
}

fn leaf_value(schema: &str, text: &str) -> PropertyValue {
    match schema {
        "int" | "long" | "short" | "byte" => text
            .trim()
            .parse()
            .map(PropertyValue::Integer)
            .unwrap_or_else(|_| PropertyValue::Text(text.to_string())),
        "boolean" => match text.trim() {
            "true" | "1" => PropertyValue::Boolean(true),
            "false" | "0" => PropertyValue::Boolean(false),
            _ => PropertyValue::Text(text.to_string()),
        },
        _ => PropertyValue::Text(text.to_string()),
    }
}

/// Records and continuation token of a `RetrievePropertiesEx` or
/// `ContinueRetrievePropertiesEx` response.
pub fn parse_retrieve_result(response: &XmlNode) -> InventoryResult<(Vec<PropertyRecord>, Option<String>)> {
    let Some(result) = response.child("returnval") else {
        return Ok((Vec::new(), None));
    };
    let mut records = Vec::new();
    for object in result.children_named("objects") {
        let obj = object
            .child("obj")
            .ok_or_else(|| InventoryError::parse("ObjectContent without obj"))?;
        let reference = match moref_of(obj) {
            Ok(r) => r,
            Err(e) => {
                log::debug!("skipping object content: {e}");
                continue;
            }
        };
        let mut record = PropertyRecord::new(reference);
        for prop in object.children_named("propSet") {
            let name = prop
                .child_text("name")
                .ok_or_else(|| InventoryError::parse("propSet without name"))?;
            let value = prop
                .child("val")
                .map(node_value)
                .unwrap_or_else(|| PropertyValue::Text(String::new()));
            record.properties.insert(name.to_string(), value);
        }
        for missing in object.children_named("missingSet") {
            log::debug!(
                "{}: property '{}' unavailable",
                record.reference,
                missing.child_text("path").unwrap_or("?")
            );
        }
        records.push(record);
    }
    let token = result
        .child_text("token")
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    Ok((records, token))
}

pub fn parse_service_content(response: &XmlNode) -> InventoryResult<ServiceContent> {
    let content = response
        .child("returnval")
        .ok_or_else(|| InventoryError::parse("RetrieveServiceContent returned nothing"))?;
    let reference = |name: &str| {
        content
            .child(name)
            .ok_or_else(|| InventoryError::parse(format!("service content lacks {name}")))
            .and_then(moref_of)
    };
    let about = content.child("about");
    let field = |name: &str| {
        about
            .and_then(|a| a.child_text(name))
            .unwrap_or_default()
            .to_string()
    };
    Ok(ServiceContent {
        root_folder: reference("rootFolder")?,
        property_collector: reference("propertyCollector")?,
        view_manager: reference("viewManager")?,
        session_manager: reference("sessionManager")?,
        about: AboutInfo {
            name: field("name"),
            full_name: field("fullName"),
            vendor: field("vendor"),
            version: field("version"),
            build: field("build"),
            os_type: field("osType"),
            api_type: field("apiType"),
            api_version: field("apiVersion"),
            product_line_id: field("productLineId"),
            instance_uuid: field("instanceUuid"),
        },
    })
}

/// The `returnval` of a call that returns a single reference.
pub fn parse_reference_return(response: &XmlNode) -> InventoryResult<ObjectReference> {
    let node = response
        .child("returnval")
        .ok_or_else(|| InventoryError::parse(format!("{} returned nothing", response.name)))?;
    moref_of(node)
}

/// The `returnval` of a call that returns a string.
pub fn parse_string_return(response: &XmlNode) -> InventoryResult<String> {
    response
        .child_text("returnval")
        .map(str::to_string)
        .ok_or_else(|| InventoryError::parse(format!("{} returned nothing", response.name)))
}
