//! Pending state-variable changes and their LastChange rendering.

use std::io::Cursor;

use quick_xml::{
    events::{BytesEnd, BytesStart, Event},
    Writer,
};

use crate::model::ChangeEvent;

pub const AVTRANSPORT_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/AVT/";
pub const RENDERINGCONTROL_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/RCS/";

/// Drain-once buffer of [`ChangeEvent`]s.
///
/// Recording a variable that is already pending replaces its value in place,
/// so a batch never carries two values for the same variable.
#[derive(Debug, Default)]
pub struct ChangeAccumulator {
    pending: Vec<ChangeEvent>,
}

impl ChangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, variable: &str, value: impl Into<String>) {
        let event = ChangeEvent::new(variable, value);
        match self.pending.iter_mut().find(|e| e.variable == variable) {
            Some(existing) => *existing = event,
            None => self.pending.push(event),
        }
    }

    /// Takes every pending event, leaving the accumulator empty.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Events drained from one service during one notifier tick.
#[derive(Clone, Debug)]
pub struct LastChangeBatch {
    pub service: String,
    pub namespace: String,
    pub events: Vec<ChangeEvent>,
}

impl LastChangeBatch {
    /// Renders the LastChange document:
    ///
    /// ```xml
    /// <Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/">
    ///   <InstanceID val="0"><TransportState val="PLAYING"/></InstanceID>
    /// </Event>
    /// ```
    pub fn to_xml(&self) -> Result<String, String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let event = BytesStart::new("Event").with_attributes([("xmlns", self.namespace.as_str())]);
        writer
            .write_event(Event::Start(event))
            .map_err(|e| e.to_string())?;

        let instance = BytesStart::new("InstanceID").with_attributes([("val", "0")]);
        writer
            .write_event(Event::Start(instance))
            .map_err(|e| e.to_string())?;

        for change in &self.events {
            let var = BytesStart::new(change.variable.as_str())
                .with_attributes([("val", change.value.as_str())]);
            writer
                .write_event(Event::Empty(var))
                .map_err(|e| e.to_string())?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("InstanceID")))
            .map_err(|e| e.to_string())?;
        writer
            .write_event(Event::End(BytesEnd::new("Event")))
            .map_err(|e| e.to_string())?;

        String::from_utf8(writer.into_inner().into_inner()).map_err(|e| e.to_string())
    }
}
