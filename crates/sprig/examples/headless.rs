//! Renders one frame through the recording GL backend and prints every GL
//! call it produced, followed by the frame's stats.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p sprig --example headless
//! ```

use std::rc::Rc;

use image::{Rgba, RgbaImage};
use sprig::batch::Batch;
use sprig::gl::{Gl, RecordingGl};
use sprig::{Graphics, RenderConfig, TextureConfig};

fn main() -> sprig::Result<()> {
    env_logger::init();

    let rec = Rc::new(RecordingGl::new());
    let gl: Rc<dyn Gl> = rec.clone();
    let config = RenderConfig {
        check_errors: true,
        ..RenderConfig::default()
    };
    let mut gfx = Graphics::new(gl, config)?;
    gfx.viewport_changed(320, 240);

    let checker = RgbaImage::from_fn(16, 16, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([40, 40, 40, 255])
        }
    });
    let tex = gfx.create_texture_from_image(&checker, TextureConfig::DEFAULT.repeat(true, true))?;
    tex.reference();

    let batch = gfx.create_batch()?;
    let mut surf = gfx.create_surface(batch.clone())?;
    rec.take_calls();

    surf.begin().clear(0.1, 0.1, 0.15, 1.0);
    surf.set_fill_pattern(&tex).fill_rect(0.0, 0.0, 320.0, 240.0);

    surf.set_fill_color(0xFFCC3333);
    surf.save_tx().translate(160.0, 120.0).rotate(0.4);
    surf.fill_rect(-40.0, -20.0, 80.0, 40.0);
    surf.restore_tx();

    if surf.start_clipped(20, 20, 100, 60) {
        surf.set_alpha(0.5).draw_sized(&tex.tile(0.0, 0.0, 8.0, 8.0), 10.0, 10.0, 120.0, 80.0);
        surf.set_alpha(1.0);
    }
    surf.end_clipped();
    surf.draw_line(0.0, 239.0, 319.0, 0.0, 3.0);
    surf.end();

    for (i, call) in rec.take_calls().iter().enumerate() {
        println!("{i:4} {call:?}");
    }
    let stats = gfx.stats().reset_frame();
    println!(
        "\n{} draw calls, {} quads, {} flushes, {} texture switches, {} clips",
        stats.draw_calls, stats.quads, stats.flushes, stats.texture_switches, stats.clips
    );

    tex.release();
    batch.borrow_mut().close();
    println!(
        "live after cleanup: {} textures, {} framebuffers",
        gfx.live_textures(),
        gfx.live_framebuffers()
    );
    Ok(())
}
