//! Responsive `<picture>` markup rendering
//!
//! Maps the derivative groups returned by the image service, together with the
//! settings they were generated from, into `<picture>`/`<source>`/`<img>`
//! fragments with `sizes`, `srcset`, and `media` attributes plus WebP
//! alternates.
//!
//! Groups are aligned by index with the settings list. The first declared group
//! is the default: its elements carry no `media` qualifier and it owns the
//! fallback `<img>`. The remaining groups are emitted before it, in reverse
//! declaration order, as media-qualified `<source>` elements. Declare the
//! widest variant first so it becomes the unqualified fallback.
//!
//! Elements are built with `maud`, which escapes every attribute value.

use crate::models::{Breakpoint, DerivativeGroup, DerivedSetting, PhotoRequest, UploadResult};
use crate::{Error, Result};
use maud::{html, Markup, PreEscaped};

const SRCSET_SEPARATOR: &str = ",\n\t\t";

/// A validated `W:H` aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidAspectRatio(input.to_string());

        let (w, h) = input.split_once(':').ok_or_else(invalid)?;
        let component = |s: &str| -> Result<u32> {
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            s.parse().map_err(|_| invalid())
        };

        let ratio = Self {
            width: component(w)?,
            height: component(h)?,
        };
        if ratio.width == 0 || ratio.height == 0 {
            return Err(invalid());
        }
        Ok(ratio)
    }

    /// Crop height for an image `width` pixels wide, rounded up.
    pub fn height_for(&self, width: u32) -> u32 {
        let scaled = u64::from(width) * u64::from(self.height);
        let height = scaled.div_ceil(u64::from(self.width));
        u32::try_from(height).unwrap_or(u32::MAX)
    }
}

/// Which markup blocks to emit for each photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Emit `<source type="image/webp">` alternates in the computed block.
    pub webp: bool,
    /// Also emit a block built from the service's own breakpoint URLs.
    pub native_block: bool,
    /// Emit only the native block.
    pub native_only: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            webp: true,
            native_block: false,
            native_only: false,
        }
    }
}

fn append_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query)
}

/// Resized image URL: `?w=` plus `&h=…&fit=crop` when a crop height applies.
pub fn computed_url(base: &str, width: u32, height: u32) -> String {
    if height > 0 {
        append_query(base, &format!("w={}&h={}&fit=crop", width, height))
    } else {
        append_query(base, &format!("w={}", width))
    }
}

pub fn webp_url(computed: &str) -> String {
    append_query(computed, "fm=webp")
}

pub fn sizes_attr(max_width: u32, view_port_ratio: u32) -> String {
    let max_viewport_width =
        (f64::from(max_width) / (f64::from(view_port_ratio) / 100.0)).round() as u64;
    format!(
        "(max-width: {}px) {}vw, {}px",
        max_viewport_width, view_port_ratio, max_width
    )
}

/// `media` condition from the setting's screen bounds, `None` when neither
/// bound is positive.
pub fn media_query(setting: &DerivedSetting) -> Option<String> {
    let mut conditions = Vec::new();
    if setting.screen_min_width > 0 {
        conditions.push(format!("(min-width: {}px)", setting.screen_min_width));
    }
    if setting.screen_max_width > 0 {
        conditions.push(format!("(max-width: {}px)", setting.screen_max_width));
    }

    if conditions.is_empty() {
        None
    } else {
        Some(conditions.join(" and "))
    }
}

/// Per-group attribute values shared by every block.
struct GroupMarkup {
    sizes: String,
    media: Option<String>,
    native_srcset: String,
    webp_srcset: String,
    computed_srcset: String,
}

fn descriptor(url: &str, width: u32) -> String {
    format!("{} {}w", url, width)
}

fn build_group(base: &str, setting: &DerivedSetting, group: &DerivativeGroup) -> Result<GroupMarkup> {
    let ratio = setting
        .transformation
        .aspect_ratio
        .as_deref()
        .map(AspectRatio::parse)
        .transpose()?;

    let mut breakpoints: Vec<&Breakpoint> = group.breakpoints.iter().collect();
    breakpoints.sort_by_key(|b| b.width);
    let max_width = breakpoints
        .last()
        .map(|b| b.width)
        .ok_or_else(|| Error::Render("derivative group has no breakpoints".to_string()))?;

    let mut native = Vec::with_capacity(breakpoints.len());
    let mut webp = Vec::with_capacity(breakpoints.len());
    let mut computed = Vec::with_capacity(breakpoints.len());

    for breakpoint in breakpoints {
        let height = ratio.map_or(0, |r| r.height_for(breakpoint.width));
        let url = computed_url(base, breakpoint.width, height);

        native.push(descriptor(&breakpoint.secure_url, breakpoint.width));
        webp.push(descriptor(&webp_url(&url), breakpoint.width));
        computed.push(descriptor(&url, breakpoint.width));
    }

    Ok(GroupMarkup {
        sizes: sizes_attr(max_width, setting.view_port_ratio),
        media: media_query(setting),
        native_srcset: native.join(SRCSET_SEPARATOR),
        webp_srcset: webp.join(SRCSET_SEPARATOR),
        computed_srcset: computed.join(SRCSET_SEPARATOR),
    })
}

fn source(group: &GroupMarkup, srcset: &str, qualified: bool, mime: Option<&str>) -> Markup {
    let media = if qualified { group.media.as_deref() } else { None };
    html! {
        source sizes=(group.sizes) srcset=(srcset) media=[media] type=[mime];
    }
}

fn img(group: &GroupMarkup, srcset: &str, src: &str, alt: &str) -> Markup {
    html! {
        img sizes=(group.sizes) srcset=(srcset) src=(src) alt=(alt);
    }
}

/// One element per line, inside `<picture>` when `picture` is set.
fn block(elements: Vec<Markup>, picture: bool) -> Markup {
    html! {
        @if picture {
            picture {
                @for element in elements {
                    "\n\t" (element)
                }
                "\n"
            }
            "\n"
        } @else {
            @for element in elements {
                (element) "\n"
            }
        }
    }
}

/// `<!-- Upload for PUBLIC_ID … -->` header. The id is escaped so it can never
/// close the comment early.
fn header(public_id: &str) -> Markup {
    let id = html! { (public_id) }.into_string();
    PreEscaped(format!("\n<!-- Upload for PUBLIC_ID {} -->\n", id))
}

/// Non-default groups in reverse declaration order, then the default group.
fn emission_order(count: usize) -> impl Iterator<Item = usize> {
    (1..count).rev().chain(std::iter::once(0))
}

/// Render markup for one uploaded photo.
///
/// Every attribute value is HTML-escaped, so query-string `&` separators in
/// computed URLs come out as `&amp;`.
pub fn render_markup(
    photo: &PhotoRequest,
    settings: &[DerivedSetting],
    upload: &UploadResult,
    options: &RenderOptions,
) -> Result<String> {
    let derivatives = &upload.responsive_breakpoints;
    if derivatives.is_empty() {
        return Err(Error::Render("upload returned no derivative groups".to_string()));
    }
    if derivatives.len() != settings.len() {
        return Err(Error::Render(format!(
            "expected {} derivative groups, got {}",
            settings.len(),
            derivatives.len()
        )));
    }

    let base = photo.url.as_deref().unwrap_or(upload.secure_url.as_str());
    let groups = settings
        .iter()
        .zip(derivatives)
        .map(|(setting, group)| build_group(base, setting, group))
        .collect::<Result<Vec<_>>>()?;
    let alt = photo.alt_text();

    let native = (options.native_block || options.native_only).then(|| {
        let elements = emission_order(groups.len())
            .map(|index| {
                let group = &groups[index];
                if index == 0 {
                    img(group, &group.native_srcset, &upload.secure_url, alt)
                } else {
                    source(group, &group.native_srcset, true, None)
                }
            })
            .collect();
        block(elements, groups.len() > 1)
    });

    let computed = (!options.native_only).then(|| {
        let mut elements = Vec::new();
        for index in emission_order(groups.len()) {
            let group = &groups[index];
            let qualified = index != 0;
            if options.webp {
                elements.push(source(
                    group,
                    &group.webp_srcset,
                    qualified,
                    Some("image/webp"),
                ));
            }
            if qualified {
                elements.push(source(group, &group.computed_srcset, true, None));
            } else {
                elements.push(img(group, &group.computed_srcset, base, alt));
            }
        }
        block(elements, groups.len() > 1 || options.webp)
    });

    let markup = html! {
        (header(&upload.public_id))
        @if let Some(native) = native {
            (native)
        }
        @if let Some(computed) = computed {
            (computed)
        }
    };
    Ok(markup.into_string())
}
