//! Reassembly of engine detections into reading order.

const INDENT_UNIT: usize = 4;
const MAX_INDENT_LEVELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height.max(1))
    }

    /// Undo a preprocessing upscale
    pub fn unscale(&self, factor: f32) -> Self {
        if factor <= 0.0 || factor == 1.0 {
            return *self;
        }
        let f = |v: u32| ((v as f32) / factor).round() as u32;
        Self::new(f(self.x), f(self.y), f(self.width), f(self.height))
    }
}

/// One detection from the recognition engine
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub bbox: BoundingBox,
    /// 0.0 ..= 1.0
    pub confidence: f32,
}

impl Fragment {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

struct Line<'a> {
    top: u32,
    bottom: u32,
    fragments: Vec<&'a Fragment>,
}

impl Line<'_> {
    fn height(&self) -> u32 {
        self.bottom - self.top
    }

    fn left(&self) -> u32 {
        self.fragments.iter().map(|f| f.bbox.x).min().unwrap_or(0)
    }

    fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Group fragments into lines by vertical overlap.
///
/// Lines come out top to bottom; fragments inside a line left to right, with
/// ties kept in input order.
pub fn group_lines(fragments: &[Fragment]) -> Vec<Vec<&Fragment>> {
    build_lines(fragments)
        .into_iter()
        .map(|line| line.fragments)
        .collect()
}

fn build_lines(fragments: &[Fragment]) -> Vec<Line<'_>> {
    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| f.bbox.y);

    let mut lines: Vec<Line<'_>> = Vec::new();
    for fragment in ordered {
        let (top, bottom) = (fragment.bbox.y, fragment.bbox.bottom());

        if let Some(line) = lines.last_mut() {
            let overlap = line.bottom.min(bottom).saturating_sub(line.top.max(top));
            let shorter = line.height().min(bottom - top);
            if overlap > 0 && overlap * 2 >= shorter {
                line.top = line.top.min(top);
                line.bottom = line.bottom.max(bottom);
                line.fragments.push(fragment);
                continue;
            }
        }

        lines.push(Line {
            top,
            bottom,
            fragments: vec![fragment],
        });
    }

    for line in &mut lines {
        line.fragments.sort_by_key(|f| f.bbox.x);
    }
    lines
}

/// Lines joined by newlines, no indentation
pub fn reading_order(fragments: &[Fragment]) -> String {
    build_lines(fragments)
        .iter()
        .map(Line::text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reading order with leading indentation rebuilt from horizontal offsets.
///
/// `region_width` is the width of the image the boxes refer to.
pub fn reassemble(fragments: &[Fragment], region_width: u32) -> String {
    let lines = build_lines(fragments);
    if lines.is_empty() {
        return String::new();
    }

    let lefts: Vec<u32> = lines.iter().map(Line::left).collect();
    let baseline = baseline(&lefts);
    let char_width = char_width(fragments, region_width);

    lines
        .iter()
        .zip(&lefts)
        .map(|(line, &left)| {
            let mut offset = left.saturating_sub(baseline) as f32;
            if offset > region_width as f32 * 0.5 {
                offset = 0.0;
            }
            let spaces = (offset / char_width).round() as usize;
            let level = ((spaces as f32) / INDENT_UNIT as f32).round() as usize;
            let indent = level.min(MAX_INDENT_LEVELS) * INDENT_UNIT;
            format!("{}{}", " ".repeat(indent), line.text())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Leftmost line start, skipping a lone far-left outlier
fn baseline(lefts: &[u32]) -> u32 {
    let mut sorted = lefts.to_vec();
    sorted.sort_unstable();

    match sorted.as_slice() {
        [] => 0,
        [first, second, third, _, ..] => {
            let gap = second - first;
            let next_gap = third - second;
            if gap > next_gap * 2 { *second } else { *first }
        }
        [first, ..] => *first,
    }
}

/// Average glyph width in pixels, from the fragments themselves when possible
fn char_width(fragments: &[Fragment], region_width: u32) -> f32 {
    let (pixels, chars) = fragments
        .iter()
        .map(|f| (f.bbox.width as u64, f.text.trim().chars().count() as u64))
        .filter(|(_, chars)| *chars > 0)
        .fold((0u64, 0u64), |(p, c), (fp, fc)| (p + fp, c + fc));

    if chars > 0 && pixels > 0 {
        return (pixels as f32 / chars as f32).max(1.0);
    }

    match region_width {
        0..300 => 6.0,
        300..600 => 8.0,
        _ => 10.0,
    }
}

/// Length-weighted mean of fragment confidences
pub fn aggregate_confidence(fragments: &[Fragment]) -> f32 {
    let (weighted, total) = fragments.iter().fold((0.0f64, 0usize), |(w, t), f| {
        let len = f.text.chars().count();
        (w + f.confidence as f64 * len as f64, t + len)
    });

    if total == 0 {
        return 0.0;
    }
    (weighted / total as f64) as f32
}
