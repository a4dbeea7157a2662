use tracing::{info, warn};

use crate::error::Result;
use crate::frame::Color;
use crate::pipeline::graph::RenderGraph;

/// Several graphs started, controlled and disposed together.
#[derive(Default)]
pub struct RenderGraphCollection {
    graphs: Vec<RenderGraph>,
}

impl RenderGraphCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, graph: RenderGraph) {
        self.graphs.push(graph);
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn graphs(&self) -> &[RenderGraph] {
        &self.graphs
    }

    /// Starts every graph. A graph failing to start is disposed and the
    /// first error is returned once the others had their turn.
    pub fn start_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for graph in &mut self.graphs {
            if let Err(e) = graph.start() {
                warn!("Graph {} failed to start: {}", graph.name(), e);
                first_error.get_or_insert(e);
            }
        }
        info!("Started {} render graph(s)", self.graphs.len());
        first_error.map_or(Ok(()), Err)
    }

    pub fn dispose_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for graph in &mut self.graphs {
            if let Err(e) = graph.dispose() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn set_color(&mut self, color: Color) -> Result<()> {
        self.graphs.iter_mut().try_for_each(|g| g.set_color(color))
    }

    pub fn set_palette(&mut self, palette: &[Color]) -> Result<()> {
        self.graphs
            .iter_mut()
            .try_for_each(|g| g.set_palette(palette.to_vec()))
    }

    pub fn clear_display(&mut self) -> Result<()> {
        self.graphs.iter_mut().try_for_each(|g| g.clear_display())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::capture::PassthroughSource;
    use crate::display::VirtualDmd;
    use crate::pipeline::GraphState;

    #[test]
    fn controls_all_graphs() {
        let mut collection = RenderGraphCollection::new();
        let mut views = Vec::new();
        for name in ["left", "right"] {
            let (source, _handle) = PassthroughSource::new(name);
            let (dmd, view) = VirtualDmd::new(name, Color::RED);
            views.push(view);
            collection.add(
                RenderGraph::builder(name)
                    .source(source)
                    .destination(Arc::new(dmd))
                    .build()
                    .unwrap(),
            );
        }
        collection.start_all().unwrap();
        assert!(collection.graphs().iter().all(|g| g.state() == GraphState::Running));
        collection.set_color(Color::BLUE).unwrap();
        collection.dispose_all().unwrap();
        for view in &views {
            assert_eq!(view.color(), Color::BLUE);
            assert!(view.is_disposed());
        }
        assert!(collection.set_color(Color::RED).is_err());
    }
}
