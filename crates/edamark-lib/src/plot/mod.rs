use serde::{Deserialize, Serialize};

use crate::eda::Decomposition;
use crate::signal::{MarkerChannel, TimeSeries};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Color(pub u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        let sample = points[start];
        result.push(sample);
    }
    result
}

fn line(name: &str, points: Vec<[f64; 2]>, width: f32, color: u32) -> Series {
    Series::Line(LineSeries {
        name: name.into(),
        points,
        style: Style {
            width,
            color: Color(color),
        },
    })
}

fn scaled_points(data: &[f64], fs: f64, max_points: usize) -> Vec<[f64; 2]> {
    let dt = 1.0 / fs.max(f64::MIN_POSITIVE);
    let points: Vec<[f64; 2]> = data
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();
    decimate_points(&points, max_points)
}

pub fn figure_from_timeseries(
    title: &str,
    series: &TimeSeries,
    max_points: usize,
    color: u32,
) -> Figure {
    let mut fig = Figure::new(Some(title.into()));
    fig.x.label = Some("seconds".into());
    fig.add_series(line(
        title,
        scaled_points(&series.data, series.fs, max_points),
        1.4,
        color,
    ));
    fig
}

/// Conductance with the marker channel overlaid. Markers are drawn as
/// vertical strokes spanning the conductance range so they survive
/// decimation.
pub fn figure_from_marked(
    title: &str,
    conductance: &TimeSeries,
    markers: &MarkerChannel,
    max_points: usize,
) -> Figure {
    let mut fig = figure_from_timeseries(title, conductance, max_points, 0x1F77B4);
    fig.y.label = Some("conductance".into());
    let (lo, hi) = conductance
        .data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if !lo.is_finite() {
        return fig;
    }
    let dt = 1.0 / conductance.fs.max(f64::MIN_POSITIVE);
    for (n, idx) in markers.marked_indices().into_iter().enumerate() {
        let x = idx as f64 * dt;
        fig.add_series(line(
            &format!("event {}", n + 1),
            vec![[x, lo], [x, hi]],
            1.0,
            0xD62728,
        ));
    }
    fig
}

/// Tonic and phasic components on a shared time axis.
pub fn figure_from_decomposition(
    title: &str,
    decomposition: &Decomposition,
    fs: f64,
    max_points: usize,
) -> Figure {
    let mut fig = Figure::new(Some(title.into()));
    fig.x.label = Some("seconds".into());
    fig.add_series(line(
        "EDA_Tonic",
        scaled_points(&decomposition.tonic, fs, max_points),
        2.0,
        0x2CA02C,
    ));
    fig.add_series(line(
        "EDA_Phasic",
        scaled_points(&decomposition.phasic, fs, max_points),
        1.2,
        0xFF7F0E,
    ));
    fig
}
