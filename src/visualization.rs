//! Visualization utilities for two-echelon solutions.
//!
//! Draws zones by kind, collection routes as solid coloured polylines and
//! transport routes as dashed polylines, and exports route data as text.

use crate::instance::{ProblemInstance, ZoneKind};
use crate::solution::{Route, Solution};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::Command;
#[cfg(feature = "resvg")]
use resvg::usvg;
#[cfg(feature = "resvg")]
use resvg::render;
#[cfg(feature = "resvg")]
use resvg::FitTo;
#[cfg(feature = "resvg")]
use resvg::tiny_skia::{Pixmap, Transform};
#[cfg(feature = "resvg")]
use resvg::usvg::TreeParsing;

const ROUTE_COLORS: [&str; 8] = [
    "#e74c3c", "#3498db", "#2ecc71", "#9b59b6", "#f39c12", "#1abc9c", "#d35400", "#34495e",
];

/// SVG visualization generator
pub struct Visualizer {
    pub width: f64,
    pub height: f64,
    pub margin: f64,
    pub node_radius: f64,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 800.0,
            height: 800.0,
            margin: 50.0,
            node_radius: 6.0,
        }
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate SVG visualization of a solution
    pub fn generate_svg(&self, instance: &ProblemInstance, solution: &Solution) -> String {
        let mut svg = String::new();

        let (min_x, max_x, min_y, max_y) = self.get_bounds(instance);
        let scale_x = (self.width - 2.0 * self.margin) / (max_x - min_x).max(1.0);
        let scale_y = (self.height - 2.0 * self.margin) / (max_y - min_y).max(1.0);
        let scale = scale_x.min(scale_y);

        let transform = |x: f64, y: f64| -> (f64, f64) {
            (self.margin + (x - min_x) * scale, self.height - self.margin - (y - min_y) * scale)
        };

        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .zone {{ fill: #95a5a6; stroke: #2c3e50; stroke-width: 1; }}
    .depot {{ fill: #c0392b; stroke: #2c3e50; stroke-width: 2; }}
    .station {{ fill: #f1c40f; stroke: #2c3e50; stroke-width: 2; }}
    .dumpsite {{ fill: #2c3e50; stroke: #000000; stroke-width: 2; }}
    .collection {{ stroke-width: 2; fill: none; }}
    .transport {{ stroke-width: 2; fill: none; stroke-dasharray: 8 4; }}
    .label {{ font-family: Arial; font-size: 10px; fill: #2c3e50; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            self.width, self.height, self.width, self.height
        ));

        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">Instance: {} | {} | CV: {} | TV: {} | Distance: {:.2}</text>
"##,
            self.margin, instance.name, solution.algorithm,
            solution.collection_routes.len(), solution.transport_routes.len(), solution.distance_after
        ));

        for (r, route) in solution.collection_routes.iter().enumerate() {
            let color = ROUTE_COLORS[r % ROUTE_COLORS.len()];
            svg.push_str(&self.polyline(instance, route, "collection", color, &transform));
        }
        for route in &solution.transport_routes {
            svg.push_str(&self.polyline(instance, route, "transport", "#7f8c8d", &transform));
        }

        for zone in &instance.zones {
            let (x, y) = transform(zone.x, zone.y);
            let (class, radius) = match zone.kind {
                ZoneKind::Depot => ("depot", self.node_radius * 1.6),
                ZoneKind::TransferStation => ("station", self.node_radius * 1.4),
                ZoneKind::Dumpsite => ("dumpsite", self.node_radius * 1.6),
                ZoneKind::CollectionZone => ("zone", self.node_radius),
            };
            svg.push_str(&format!(
                r#"<circle cx="{:.2}" cy="{:.2}" r="{:.1}" class="{}"/>
<text x="{:.2}" y="{:.2}" class="label">{}</text>
"#,
                x, y, radius, class, x + radius + 2.0, y - radius, zone.id
            ));
        }

        svg.push_str("</svg>\n");
        svg
    }

    fn polyline<F>(&self, instance: &ProblemInstance, route: &Route, class: &str, color: &str, transform: &F) -> String
    where
        F: Fn(f64, f64) -> (f64, f64),
    {
        let points: Vec<String> = route.stops.iter()
            .map(|&z| {
                let (x, y) = transform(instance.zones[z].x, instance.zones[z].y);
                format!("{:.2},{:.2}", x, y)
            })
            .collect();
        format!("<polyline points=\"{}\" class=\"{}\" stroke=\"{}\"/>\n", points.join(" "), class, color)
    }

    /// Save SVG to file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Save SVG as PNG, natively with the `resvg` feature, otherwise through
    /// `rsvg-convert`, `magick` or `inkscape`.
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        let failure = |msg: String| std::io::Error::new(std::io::ErrorKind::Other, msg);

        #[cfg(feature = "resvg")]
        {
            let opt = usvg::Options::default();
            let rtree = usvg::Tree::from_str(svg, &opt).map_err(|e| failure(format!("usvg parse error: {}", e)))?;
            let mut pixmap = Pixmap::new(self.width as u32, self.height as u32)
                .ok_or_else(|| failure("failed to create pixmap".to_string()))?;
            render(&rtree, FitTo::Original, Transform::default(), pixmap.as_mut())
                .ok_or_else(|| failure("resvg render failed".to_string()))?;
            pixmap.save_png(path).map_err(|e| failure(format!("save_png failed: {}", e)))?;
            return Ok(());
        }

        #[allow(unreachable_code)]
        {
            let tmp_svg = path.with_extension("svg.tmp");
            self.save_svg(svg, &tmp_svg)?;
            let tmp_name = tmp_svg.to_string_lossy().into_owned();
            let out_name = path.to_string_lossy().into_owned();
            let (input, output) = (tmp_name.as_str(), out_name.as_str());

            let converters: [(&str, Vec<&str>); 3] = [
                ("rsvg-convert", vec!["-o", output, input]),
                ("magick", vec!["convert", input, output]),
                ("inkscape", vec![input, "--export-type=png", "--export-filename", output]),
            ];
            for (program, args) in &converters {
                if let Ok(status) = Command::new(program).args(args).status() {
                    if status.success() {
                        let _ = std::fs::remove_file(&tmp_svg);
                        return Ok(());
                    }
                }
            }

            let _ = std::fs::remove_file(&tmp_svg);
            Err(failure("no SVG->PNG converter succeeded (tried rsvg-convert, magick, inkscape)".to_string()))
        }
    }

    /// Get coordinate bounds
    fn get_bounds(&self, instance: &ProblemInstance) -> (f64, f64, f64, f64) {
        instance.zones.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
            |(min_x, max_x, min_y, max_y), z| (min_x.min(z.x), max_x.max(z.x), min_y.min(z.y), max_y.max(z.y)),
        )
    }

    /// Export zones and routes for external plotting
    pub fn export_plot_data(&self, instance: &ProblemInstance, solution: &Solution) -> String {
        let mut data = String::new();

        data.push_str(&format!("# Instance: {}\n", instance.name));
        data.push_str(&format!("# Algorithm: {}\n\n", solution.algorithm));

        data.push_str("# Zones: id, kind, x, y, demand\n");
        for zone in &instance.zones {
            data.push_str(&format!("{},{:?},{},{},{}\n", zone.id, zone.kind, zone.x, zone.y, zone.demand));
        }

        let fleets = [("collection", &solution.collection_routes), ("transport", &solution.transport_routes)];
        for (label, routes) in fleets {
            data.push_str(&format!("\n# {} routes\n", label));
            for route in routes {
                data.push_str(&route.labels(instance).join(","));
                data.push('\n');
            }
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::{ConstructionHeuristic, GreedyHeuristic};
    use crate::instance::tests::create_test_instance;

    #[test]
    fn test_visualizer() {
        let instance = create_test_instance();
        let solution = GreedyHeuristic::new().construct(&instance).unwrap();

        let svg = Visualizer::new().generate_svg(&instance, &solution);

        assert!(svg.contains("<svg"));
        assert_eq!(svg.matches("class=\"collection\"").count(), 1);
        assert_eq!(svg.matches("class=\"transport\"").count(), 1);
        assert_eq!(svg.matches("<circle").count(), instance.zones.len());
    }

    #[test]
    fn test_plot_data_lists_routes() {
        let instance = create_test_instance();
        let solution = GreedyHeuristic::new().construct(&instance).unwrap();

        let data = Visualizer::new().export_plot_data(&instance, &solution);
        assert!(data.contains("Depot,Z1,Z2,IF,Z3,IF,Depot"));
        assert!(data.contains("Dumpsite,IF,IF,Dumpsite"));
    }
}
