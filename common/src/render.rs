use core::convert::Infallible;

use chrono::{Local, NaiveDateTime};
use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoFont, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Circle, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle},
    text::{Baseline, Text},
};

use crate::{
    config::RenderStyle,
    plane::{BitmapPlane, Frame, Scaled},
    types::EntityState,
};

const HEADLINE_FONT: &MonoFont<'static> = &FONT_10X20;
const FOOTER_FONT: &MonoFont<'static> = &FONT_10X20;

const CARD_MARGIN: u32 = 40;
const CARD_BORDER: u32 = 8;
const FREE_SCALE: u32 = 8;
const LABEL_SCALE: u32 = 10;
const SIGN_RADIUS: u32 = 180;
const SIGN_RING: u32 = 35;
const SIGN_BAR_HEIGHT: u32 = 60;
const SIGN_LIFT: i32 = 20;

pub trait Renderer {
    fn render(&self, state: EntityState, size: Size) -> Frame;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusRenderer {
    style: RenderStyle,
}

impl StatusRenderer {
    pub fn new(style: RenderStyle) -> Self {
        Self { style }
    }

    pub fn render_at(
        &self,
        state: EntityState,
        size: Size,
        updated: Option<NaiveDateTime>,
    ) -> Frame {
        let mut frame = Frame::blank(size.width, size.height);

        match (self.style, state) {
            (RenderStyle::Dnd, EntityState::Active) => draw_no_entry_sign(&mut frame),
            (RenderStyle::Dnd, EntityState::Inactive) => draw_free_card(&mut frame.primary),
            (RenderStyle::Label, EntityState::Active) => {
                draw_centered_headline(&mut frame.accent, "ON", LABEL_SCALE, 0);
            }
            (RenderStyle::Label, EntityState::Inactive) => {
                draw_centered_headline(&mut frame.primary, "OFF", LABEL_SCALE, 0);
            }
        }

        if let Some(updated) = updated {
            draw_footer(&mut frame.primary, updated);
        }

        frame
    }
}

impl Renderer for StatusRenderer {
    fn render(&self, state: EntityState, size: Size) -> Frame {
        self.render_at(state, size, Some(Local::now().naive_local()))
    }
}

fn draw_free_card(primary: &mut BitmapPlane) {
    let size = primary.size();
    let card = Rectangle::new(
        Point::new(CARD_MARGIN as i32, CARD_MARGIN as i32),
        Size::new(
            size.width.saturating_sub(2 * CARD_MARGIN),
            size.height.saturating_sub(2 * CARD_MARGIN),
        ),
    );
    let style = PrimitiveStyleBuilder::new()
        .stroke_color(BinaryColor::On)
        .stroke_width(CARD_BORDER)
        .fill_color(BinaryColor::Off)
        .build();
    infallible(card.into_styled(style).draw(primary));

    draw_centered_headline(primary, "FREE", FREE_SCALE, -SIGN_LIFT);
}

fn draw_no_entry_sign(frame: &mut Frame) {
    let size = frame.accent.size();
    let center = Point::new(
        (size.width / 2) as i32,
        (size.height / 2) as i32 - SIGN_LIFT,
    );
    let inner_radius = SIGN_RADIUS - SIGN_RING;

    infallible(
        Circle::with_center(center, 2 * SIGN_RADIUS)
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut frame.accent),
    );

    // Clear the centre on both planes so the panel shows white there.
    let inner = Circle::with_center(center, 2 * inner_radius)
        .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off));
    infallible(inner.draw(&mut frame.accent));
    infallible(inner.draw(&mut frame.primary));

    let bar_width = inner_radius * 2 - 20;
    let bar = Rectangle::with_center(center, Size::new(bar_width, SIGN_BAR_HEIGHT));
    infallible(
        bar.into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut frame.accent),
    );
}

fn draw_centered_headline(plane: &mut BitmapPlane, text: &str, scale: u32, lift: i32) {
    let size = plane.size();
    let glyph = HEADLINE_FONT.character_size;
    let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
    let text_width = glyph.width.saturating_mul(chars).saturating_mul(scale);
    let text_height = glyph.height * scale;

    let origin = Point::new(
        (size.width.saturating_sub(text_width) / 2) as i32,
        (size.height.saturating_sub(text_height) / 2) as i32 + lift,
    );

    let mut scaled = Scaled::new(plane, scale, origin);
    let style = MonoTextStyle::new(HEADLINE_FONT, BinaryColor::On);
    infallible(Text::with_baseline(text, Point::zero(), style, Baseline::Top).draw(&mut scaled));
}

fn draw_footer(primary: &mut BitmapPlane, updated: NaiveDateTime) {
    let label = format!("Updated: {}", updated.format("%H:%M %d/%m/%Y"));
    let height = primary.size().height as i32;
    let style = MonoTextStyle::new(FOOTER_FONT, BinaryColor::On);
    infallible(
        Text::with_baseline(&label, Point::new(10, height - 30), style, Baseline::Top)
            .draw(primary),
    );
}

fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::config::{DISPLAY_HEIGHT, DISPLAY_WIDTH};

    fn size() -> Size {
        Size::new(DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }

    #[test]
    fn active_dnd_uses_accent_sign() {
        let frame =
            StatusRenderer::new(RenderStyle::Dnd).render_at(EntityState::Active, size(), None);

        // Ring and bar are accent ink; centre of the bar too.
        assert!(frame.accent.is_ink(400, 220));
        assert!(frame.accent.is_ink(400 - 170, 220));
        // Inside the ring but off the bar stays white.
        assert!(!frame.accent.is_ink(400, 220 - 100));
        assert_eq!(frame.primary.ink_count(), 0);
    }

    #[test]
    fn inactive_dnd_draws_free_card_on_primary() {
        let frame =
            StatusRenderer::new(RenderStyle::Dnd).render_at(EntityState::Inactive, size(), None);

        assert_eq!(frame.accent.ink_count(), 0);
        // Card border.
        assert!(frame.primary.is_ink(42, 200));
        assert!(frame.primary.is_ink(400, 42));
        // Inside the card but outside the text is white.
        assert!(!frame.primary.is_ink(100, 100));
        // Headline ink lives in the middle band.
        let text_ink = (140..300)
            .flat_map(|y| (240..560).map(move |x| (x, y)))
            .filter(|(x, y)| frame.primary.is_ink(*x, *y))
            .count();
        assert!(text_ink > 1_000);
    }

    #[test]
    fn label_style_colours_by_state() {
        let renderer = StatusRenderer::new(RenderStyle::Label);
        let on = renderer.render_at(EntityState::Active, size(), None);
        assert!(on.accent.ink_count() > 0);
        assert_eq!(on.primary.ink_count(), 0);

        let off = renderer.render_at(EntityState::Inactive, size(), None);
        assert!(off.primary.ink_count() > 0);
        assert_eq!(off.accent.ink_count(), 0);
    }

    #[test]
    fn footer_is_drawn_at_bottom_left() {
        let updated = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        let with_footer = StatusRenderer::new(RenderStyle::Dnd).render_at(
            EntityState::Active,
            size(),
            Some(updated),
        );

        let footer_ink = (450..470)
            .flat_map(|y| (10..300).map(move |x| (x, y)))
            .filter(|(x, y)| with_footer.primary.is_ink(*x, *y))
            .count();
        assert!(footer_ink > 0);
    }

    #[test]
    fn render_matches_requested_size() {
        let frame = StatusRenderer::default().render(EntityState::Inactive, Size::new(200, 100));
        assert_eq!(frame.primary.width(), 200);
        assert_eq!(frame.accent.height(), 100);
    }
}
