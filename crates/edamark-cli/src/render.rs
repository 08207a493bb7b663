use anyhow::Result;
use edamark_lib::plot::{Figure, PlotBackend, Series};
use plotters::prelude::*;
use std::path::PathBuf;

/// Renders figures to PNG files via plotters.
pub struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            size: (1200, 480),
        }
    }
}

fn rgb(color: u32) -> RGBColor {
    RGBColor(
        ((color >> 16) & 0xFF) as u8,
        ((color >> 8) & 0xFF) as u8,
        (color & 0xFF) as u8,
    )
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if lo == hi {
        return (lo - 0.5, hi + 0.5);
    }
    (lo, hi)
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let points = || {
            fig.series.iter().flat_map(|series| match series {
                Series::Line(line) => line.points.iter(),
            })
        };
        let (x_min, x_max) = bounds(points().map(|p| p[0]));
        let (y_min, y_max) = bounds(points().map(|p| p[1]));
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;

        let mut labelled = false;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let color = rgb(line.style.color.0);
                    let style = color.stroke_width(line.style.width.round().max(1.0) as u32);
                    let drawn = chart.draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        style,
                    ))?;
                    if !line.name.starts_with("event ") {
                        drawn.label(line.name.clone()).legend(move |(x, y)| {
                            PathElement::new(vec![(x, y), (x + 20, y)], color)
                        });
                        labelled = true;
                    }
                }
            }
        }
        if labelled {
            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
        root.present()?;
        Ok(())
    }
}
