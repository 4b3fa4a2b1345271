use crate::models::PageSize;

/// Power-of-two decode factor that keeps the decoded image at or above the
/// requested size while bounding memory.
pub fn sample_size(width: u32, height: u32, req_width: u32, req_height: u32) -> u32 {
    let req_width = req_width.max(1);
    let req_height = req_height.max(1);
    let mut sample = 1u32;

    if height > req_height || width > req_width {
        let half_height = height / 2;
        let half_width = width / 2;

        while half_height / sample >= req_height && half_width / sample >= req_width {
            sample *= 2;
        }
    }

    sample
}

pub fn sampled_dimensions(width: u32, height: u32, sample: u32) -> (u32, u32) {
    let sample = sample.max(1);
    ((width / sample).max(1), (height / sample).max(1))
}

pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = (max_width as f32 / width as f32).min(max_height as f32 / height as f32);
    if scale >= 1.0 {
        return (width, height);
    }
    (
        ((width as f32 * scale) as u32).max(1),
        ((height as f32 * scale) as u32).max(1),
    )
}

pub fn uniform_page_size(images: &[(u32, u32)], page_size: PageSize) -> Option<(f32, f32)> {
    if let Some(fixed) = page_size.dimensions() {
        return Some(fixed);
    }
    let max_width = images.iter().map(|&(w, _)| w).max()?;
    let max_height = images.iter().map(|&(_, h)| h).max()?;
    Some((max_width as f32, max_height as f32))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Placement {
    pub fn pdf_y(&self, page_height: f32) -> f32 {
        page_height - self.y - self.height
    }
}

/// Fits an image into the page box (page minus margins) and centers it.
pub fn place_in_page(
    (image_width, image_height): (u32, u32),
    (page_width, page_height): (f32, f32),
    margin: f32,
) -> Placement {
    let max_margin = ((page_width.min(page_height) - 1.0) / 2.0).max(0.0);
    let margin = margin.clamp(0.0, max_margin);

    let available_width = page_width - 2.0 * margin;
    let available_height = page_height - 2.0 * margin;

    let image_width = image_width.max(1) as f32;
    let image_height = image_height.max(1) as f32;
    let scale = (available_width / image_width).min(available_height / image_height);

    let width = image_width * scale;
    let height = image_height * scale;

    Placement {
        x: margin + (available_width - width) / 2.0,
        y: margin + (available_height - height) / 2.0,
        width,
        height,
    }
}
