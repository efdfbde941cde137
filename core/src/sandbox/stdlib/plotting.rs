//! `matplotlib.pyplot`, `seaborn` and pandas `.plot` over the in-memory figure
//!
//! Every drawing call appends a `Mark` to a panel of `interp.figure`.
//! `savefig` renders the figure into the execution's artifact slot; the file
//! name argument is accepted and ignored. Styling calls that have no effect on
//! the model (ticks, spines, layout) return `Val::Inert`.

use super::pandas::{cells_of, is_list_like};
use super::{numpy, Args, KW};
use crate::sandbox::chart::{parse_color, render_png, Figure, Mark, MarkKind, Panel, Rgb};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::types::{raise, EvalResult, ExcKind, Module, PlotHandle, Val};
use crate::table::format::label_text;
use crate::table::{Cell, DataFrame, Series};
use std::rc::Rc;

const DARK_FACE: Rgb = Rgb([0x11, 0x11, 0x11]);
const DARK_GRID: Rgb = Rgb([0x33, 0x33, 0x33]);

/// Axes methods that draw or label a panel
const AXES_METHODS: [&str; 35] = [
    "plot", "bar", "barh", "scatter", "hist", "fill_between", "axhline", "axvline", "errorbar",
    "pie", "boxplot", "violinplot", "table", "set_title",
    "set_xlabel", "set_ylabel", "set_xlim", "set_ylim", "set_facecolor", "grid", "legend", "set",
    "twinx", "twiny", "tick_params", "set_xticks", "set_yticks", "set_xticklabels",
    "set_yticklabels", "invert_yaxis", "invert_xaxis", "text", "annotate", "axis", "get_figure",
];

const FIGURE_METHODS: [&str; 8] = [
    "savefig", "suptitle", "set_facecolor", "tight_layout", "add_subplot", "gca", "subplots_adjust",
    "autofmt_xdate",
];

/* ===================== Module ===================== */

pub fn module_attr(module: &Val, attr: &str) -> EvalResult<Val> {
    match attr {
        "rcParams" | "cm" | "colors" | "dates" | "ticker" => Ok(Val::Inert),
        _ => Ok(Val::method(module.clone(), attr)),
    }
}

pub fn call_function(interp: &mut Interpreter, module: &Val, name: &str, args: Args) -> EvalResult<Val> {
    match module {
        Val::Module(Module::Seaborn) => seaborn_call(interp, name, &args),
        _ => pyplot_call(interp, name, &args),
    }
}

fn pyplot_call(interp: &mut Interpreter, name: &str, args: &Args) -> EvalResult<Val> {
    match name {
        "figure" => {
            let (width, height) = figsize(args)?;
            fresh_figure(interp, width, height, 1, 1);
            apply_figure_face(interp, args);
            Ok(Val::Plot(PlotHandle::Figure))
        }
        "subplots" => {
            let rows = args.usize_or(0, "nrows", 1)?;
            let cols = args.usize_or(1, "ncols", 1)?;
            let (width, height) = figsize(args)?;
            fresh_figure(interp, width, height, rows, cols);
            apply_figure_face(interp, args);
            Ok(Val::tuple(vec![Val::Plot(PlotHandle::Figure), axes_grid(rows.max(1), cols.max(1))]))
        }
        "subplot" => {
            let (rows, cols, index) = subplot_position(args)?;
            if interp.figure.rows != rows || interp.figure.cols != cols {
                let (width, height) = (interp.figure.width_in, interp.figure.height_in);
                fresh_figure(interp, width, height, rows, cols);
            }
            interp.figure.panel_mut(index);
            Ok(Val::Plot(PlotHandle::Axes(interp.figure.current)))
        }
        "gca" => Ok(Val::Plot(PlotHandle::Axes(interp.figure.current))),
        "gcf" => Ok(Val::Plot(PlotHandle::Figure)),
        "savefig" => savefig(interp, args),
        "clf" | "close" | "cla" => {
            let (width, height) = (interp.figure.width_in, interp.figure.height_in);
            fresh_figure(interp, width, height, 1, 1);
            Ok(Val::None)
        }
        "suptitle" => {
            interp.figure.suptitle = Some(text_arg(args, 0, "t")?);
            Ok(Val::Inert)
        }
        "title" | "xlabel" | "ylabel" | "xlim" | "ylim" => {
            let panel = interp.figure.current;
            axes_call(interp, panel, &format!("set_{}", name), args)
        }
        "style.use" | "style.context" => {
            let style = args.get(0, "style").map(Val::to_str).unwrap_or_default();
            if style.contains("dark") {
                interp.dark_style = true;
                if interp.figure.is_blank() {
                    let (width, height) = (interp.figure.width_in, interp.figure.height_in);
                    let (rows, cols) = (interp.figure.rows, interp.figure.cols);
                    fresh_figure(interp, width, height, rows, cols);
                }
            }
            Ok(Val::Inert)
        }
        "show" | "tight_layout" | "xticks" | "yticks" | "rc" | "ion" | "ioff" | "draw"
        | "pause" | "subplots_adjust" | "margins" | "box" | "minorticks_on" | "locator_params"
        | "setp" | "colorbar" | "get_cmap" | "annotate" | "text" | "axis" | "twinx" => Ok(Val::Inert),
        style if style.starts_with("style.") => Ok(Val::Inert),
        other => {
            let panel = interp.figure.current;
            if AXES_METHODS.contains(&other) {
                axes_call(interp, panel, other, args)
            } else {
                raise(
                    ExcKind::AttributeError,
                    format!("module 'matplotlib.pyplot' has no attribute '{}'", other),
                )
            }
        }
    }
}

/* ===================== Handles ===================== */

pub fn attr(interp: &mut Interpreter, receiver: &Val, attr: &str) -> EvalResult<Val> {
    match (receiver, attr) {
        (Val::Plot(PlotHandle::Figure), "axes") => {
            let count = interp.figure.panels.len();
            Ok(Val::list((0..count).map(|i| Val::Plot(PlotHandle::Axes(i))).collect()))
        }
        (Val::Plot(PlotHandle::Figure), name) if FIGURE_METHODS.contains(&name) => {
            Ok(Val::method(receiver.clone(), name))
        }
        (Val::Plot(PlotHandle::Axes(_)), name) if AXES_METHODS.contains(&name) => {
            Ok(Val::method(receiver.clone(), name))
        }
        // spines, xaxis, patch, title objects and the other cosmetic handles
        _ => Ok(Val::Inert),
    }
}

pub fn call_method(interp: &mut Interpreter, handle: PlotHandle, name: &str, args: Args) -> EvalResult<Val> {
    match handle {
        PlotHandle::Axes(panel) => axes_call(interp, panel, name, &args),
        PlotHandle::Figure => match name {
            "savefig" => savefig(interp, &args),
            "suptitle" => {
                interp.figure.suptitle = Some(text_arg(&args, 0, "t")?);
                Ok(Val::Inert)
            }
            "set_facecolor" => {
                interp.figure.facecolor = color_arg(args.get(0, "color"));
                Ok(Val::None)
            }
            "add_subplot" => {
                let (rows, cols, index) = match args.positional.as_slice() {
                    [] => (1, 1, 0),
                    _ => subplot_position(&args)?,
                };
                if interp.figure.rows != rows || interp.figure.cols != cols {
                    let figure = &mut interp.figure;
                    figure.rows = rows;
                    figure.cols = cols;
                    figure.panels.resize(rows * cols, Panel::default());
                }
                interp.figure.panel_mut(index);
                Ok(Val::Plot(PlotHandle::Axes(interp.figure.current)))
            }
            "gca" => Ok(Val::Plot(PlotHandle::Axes(interp.figure.current))),
            _ => Ok(Val::Inert),
        },
    }
}

/* ===================== Axes ===================== */

fn axes_call(interp: &mut Interpreter, index: usize, name: &str, args: &Args) -> EvalResult<Val> {
    let handle = Val::Plot(PlotHandle::Axes(index));
    match name {
        "plot" => {
            let (xs, ys, fmt) = match args.positional.as_slice() {
                [y] => (default_xs(y)?, numbers(y)?, None),
                [x, y] => (cells_of(x)?, numbers(y)?, None),
                [x, y, Val::Str(fmt), ..] => (cells_of(x)?, numbers(y)?, Some(fmt.clone())),
                _ => match (args.kw("x"), args.kw("y")) {
                    (Some(x), Some(y)) => (cells_of(x)?, numbers(y)?, None),
                    _ => return raise(ExcKind::TypeError, "plot() missing data arguments"),
                },
            };
            let color = fmt.as_deref().and_then(format_color);
            let mut mark = Mark::new(MarkKind::Line, xs, ys);
            style_mark(&mut mark, args)?;
            if mark.color.is_none() {
                mark.color = color;
            }
            add_mark(interp, index, mark)
        }
        "bar" | "barh" => {
            let xs = cells_of(args.required(0, if name == "bar" { "x" } else { "y" }, name)?)?;
            let ys = numbers(args.required(1, if name == "bar" { "height" } else { "width" }, name)?)?;
            let kind = if name == "bar" { MarkKind::Bar } else { MarkKind::BarH };
            let mut mark = Mark::new(kind, xs, ys);
            style_mark(&mut mark, args)?;
            let thickness = if name == "bar" { "width" } else { "height" };
            mark.width = args.float_opt(KW, thickness)?;
            add_mark(interp, index, mark)
        }
        "scatter" => {
            let xs = cells_of(args.required(0, "x", name)?)?;
            let ys = numbers(args.required(1, "y", name)?)?;
            let mut mark = Mark::new(MarkKind::Scatter, xs, ys);
            style_mark(&mut mark, args)?;
            add_mark(interp, index, mark)
        }
        "hist" => {
            let values = numbers(args.required(0, "x", name)?)?;
            let bins = args.usize_or(1, "bins", 10)?;
            let mark = hist_mark(&values, bins, args)?;
            add_mark(interp, index, mark)
        }
        "errorbar" => {
            // the whiskers are not drawn; the points and connecting line are
            let xs = cells_of(args.required(0, "x", name)?)?;
            let ys = numbers(args.required(1, "y", name)?)?;
            let fmt = args.str_opt(KW, "fmt")?;
            let kind = match fmt.as_deref() {
                Some("o") | Some(".") | Some("none") => MarkKind::Scatter,
                _ => MarkKind::Line,
            };
            let mut mark = Mark::new(kind, xs, ys);
            style_mark(&mut mark, args)?;
            if mark.color.is_none() {
                mark.color = fmt.as_deref().and_then(format_color);
            }
            add_mark(interp, index, mark)
        }
        "pie" | "boxplot" | "violinplot" | "table" => unsupported_chart(name),
        "fill_between" => {
            let xs = cells_of(args.required(0, "x", name)?)?;
            let upper = numbers(args.required(1, "y1", name)?)?;
            let lower = match args.get(2, "y2") {
                Some(value) if is_list_like(value) => numbers(value)?,
                Some(value) => vec![value.as_f64().unwrap_or(0.0); upper.len()],
                None => vec![0.0; upper.len()],
            };
            let mut mark = Mark::new(MarkKind::Area { lower }, xs, upper);
            mark.alpha = 0.3;
            style_mark(&mut mark, args)?;
            add_mark(interp, index, mark)
        }
        "axhline" | "axvline" => {
            let at = args.float_opt(0, if name == "axhline" { "y" } else { "x" })?.unwrap_or(0.0);
            let kind = if name == "axhline" { MarkKind::HLine } else { MarkKind::VLine };
            let xs = if name == "axvline" { vec![Cell::Float(at)] } else { Vec::new() };
            let mut mark = Mark::new(kind, xs, vec![at]);
            style_mark(&mut mark, args)?;
            add_mark(interp, index, mark)
        }
        "set_title" | "set_xlabel" | "set_ylabel" => {
            let text = text_arg(args, 0, "label")?;
            let text_color = color_arg(args.kw("color"));
            let panel = interp.figure.panel_mut(index);
            match name {
                "set_title" => panel.title = Some(text),
                "set_xlabel" => panel.xlabel = Some(text),
                _ => panel.ylabel = Some(text),
            }
            if text_color.is_some() {
                panel.text_color = text_color;
            }
            Ok(Val::Inert)
        }
        "set" => {
            for (key, value) in &args.keywords {
                let single = Args::new(vec![value.clone()]);
                match key.as_str() {
                    "title" | "xlabel" | "ylabel" | "xlim" | "ylim" | "facecolor" => {
                        axes_call(interp, index, &format!("set_{}", key), &single)?;
                    }
                    _ => {}
                }
            }
            Ok(Val::Inert)
        }
        "set_xlim" | "set_ylim" => {
            let (lo_name, hi_name) = if name == "set_xlim" { ("left", "right") } else { ("bottom", "top") };
            let limits = match args.get(0, lo_name) {
                Some(pair @ (Val::Tuple(_) | Val::List(_))) => numbers(pair)?,
                lo => vec![
                    lo.and_then(Val::as_f64).unwrap_or(f64::NAN),
                    args.get(1, hi_name).and_then(Val::as_f64).unwrap_or(f64::NAN),
                ],
            };
            let panel = interp.figure.panel_mut(index);
            if let [lo, hi] = limits[..] {
                if lo.is_finite() && hi.is_finite() {
                    if name == "set_xlim" {
                        panel.xlim = Some((lo, hi));
                    } else {
                        panel.ylim = Some((lo, hi));
                    }
                }
            }
            Ok(Val::tuple(limits.into_iter().map(Val::Float).collect()))
        }
        "set_facecolor" => {
            let color = color_arg(args.get(0, "color"));
            interp.figure.panel_mut(index).facecolor = color;
            Ok(Val::None)
        }
        "grid" => {
            let visible = match args.get(0, "visible") {
                Some(value) => value.truthy()?,
                None => true,
            };
            let color = color_arg(args.kw("color")).unwrap_or(if interp.dark_style { DARK_GRID } else { Rgb([0xb0; 3]) });
            interp.figure.panel_mut(index).grid = if visible { Some(color) } else { None };
            Ok(Val::None)
        }
        "legend" => {
            interp.figure.panel_mut(index).legend = true;
            Ok(Val::Inert)
        }
        "twinx" | "twiny" => Ok(handle),
        "get_figure" => Ok(Val::Plot(PlotHandle::Figure)),
        _ => Ok(Val::Inert),
    }
}

/// Drawing calls the renderer has no mark for fail loudly instead of leaving the figure blank
fn unsupported_chart(name: &str) -> EvalResult<Val> {
    raise(
        ExcKind::NotImplementedError,
        format!(
            "{}() charts are not supported here; use a line, bar, scatter, area or histogram chart",
            name
        ),
    )
}

fn add_mark(interp: &mut Interpreter, index: usize, mut mark: Mark) -> EvalResult<Val> {
    interp.check_len(mark.xs.len().max(mark.ys.len()))?;
    if let MarkKind::Area { lower } = &mut mark.kind {
        if lower.is_empty() {
            *lower = vec![0.0; mark.ys.len()];
        }
    }
    let panel = interp.figure.panel_mut(index);
    if mark.color.is_none() && !matches!(mark.kind, MarkKind::HLine | MarkKind::VLine) {
        mark.color = Some(panel.next_color());
    }
    panel.marks.push(mark);
    Ok(Val::Plot(PlotHandle::Axes(interp.figure.current)))
}

fn hist_mark(values: &[f64], bins: usize, args: &Args) -> EvalResult<Mark> {
    let present: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    let (counts, edges) = numpy::histogram(&present, bins.max(1));
    let centers = edges.windows(2).map(|w| Cell::Float((w[0] + w[1]) / 2.0)).collect();
    let width = edges.get(1).zip(edges.first()).map(|(b, a)| b - a);
    let mut mark = Mark::new(MarkKind::Bar, centers, counts.into_iter().map(|n| n as f64).collect());
    style_mark(&mut mark, args)?;
    mark.width = width;
    Ok(mark)
}

/// `color`/`c`, `label`, `alpha`, `width` keywords shared by the drawing calls
fn style_mark(mark: &mut Mark, args: &Args) -> EvalResult<()> {
    let color = args.kw("color").or_else(|| args.kw("c")).or_else(|| args.kw("facecolor"));
    mark.color = color_arg(color).or(mark.color);
    if let Some(label) = args.given(KW, "label") {
        mark.label = Some(label.to_str());
    }
    if let Some(alpha) = args.float_opt(KW, "alpha")? {
        mark.alpha = alpha.clamp(0.0, 1.0);
    }
    Ok(())
}

/* ===================== Seaborn ===================== */

fn seaborn_call(interp: &mut Interpreter, name: &str, args: &Args) -> EvalResult<Val> {
    let index = match args.kw("ax") {
        Some(Val::Plot(PlotHandle::Axes(i))) => *i,
        _ => interp.figure.current,
    };
    match name {
        "barplot" | "lineplot" | "scatterplot" | "regplot" => {
            let (xs, ys, horizontal) = seaborn_xy(args, name)?;
            let (xs, ys) = match name {
                "scatterplot" | "regplot" => (xs, ys),
                _ => mean_by_key(&xs, &ys),
            };
            let kind = match name {
                "barplot" if horizontal => MarkKind::BarH,
                "barplot" => MarkKind::Bar,
                "lineplot" => MarkKind::Line,
                _ => MarkKind::Scatter,
            };
            let mut mark = Mark::new(kind, xs, ys);
            style_mark(&mut mark, args)?;
            if mark.color.is_none() {
                mark.color = palette_color(args);
            }
            add_mark(interp, index, mark)
        }
        "histplot" | "distplot" => {
            let values = match (args.get(0, "data"), args.kw("x")) {
                (Some(data), Some(Val::Str(column))) => column_numbers(data, column)?,
                (_, Some(x)) => numbers(x)?,
                (Some(data), None) => numbers(data)?,
                (None, None) => return raise(ExcKind::TypeError, format!("{}() missing data", name)),
            };
            let bins = args.usize_or(KW, "bins", 10)?;
            let mark = hist_mark(&values, bins, args)?;
            add_mark(interp, index, mark)
        }
        "countplot" => {
            let column = match args.kw("x").or_else(|| args.kw("y")) {
                Some(Val::Str(column)) => {
                    let data = args.required(0, "data", name)?;
                    column_cells(data, column)?
                }
                Some(values) => cells_of(values)?,
                None => cells_of(args.required(0, "data", name)?)?,
            };
            let mut keys: Vec<Cell> = Vec::new();
            let mut counts: Vec<f64> = Vec::new();
            for cell in column.iter().filter(|c| !c.is_missing()) {
                match keys.iter().position(|k| k == cell) {
                    Some(pos) => counts[pos] += 1.0,
                    None => {
                        keys.push(cell.clone());
                        counts.push(1.0);
                    }
                }
            }
            let mut mark = Mark::new(MarkKind::Bar, keys, counts);
            style_mark(&mut mark, args)?;
            if mark.color.is_none() {
                mark.color = palette_color(args);
            }
            add_mark(interp, index, mark)
        }
        "set_theme" | "set_style" | "set" | "set_palette" | "set_context" | "despine"
        | "color_palette" => {
            if let Some(Val::Str(style)) = args.get(0, "style") {
                if style.contains("dark") {
                    interp.dark_style = true;
                }
            }
            Ok(Val::Inert)
        }
        "boxplot" | "heatmap" | "kdeplot" | "violinplot" => unsupported_chart(name),
        other => raise(
            ExcKind::AttributeError,
            format!("module 'seaborn' has no attribute '{}'", other),
        ),
    }
}

/// Category and value data for a seaborn call, and whether bars run horizontally
fn seaborn_xy(args: &Args, function: &str) -> EvalResult<(Vec<Cell>, Vec<f64>, bool)> {
    let data = args.get(0, "data");
    let x = args.get(1, "x");
    let y = args.get(2, "y");
    let oriented = matches!(args.kw("orient"), Some(Val::Str(o)) if o.starts_with('h'));
    match (data, x, y) {
        (Some(data @ Val::Frame(_)), Some(Val::Str(x)), Some(Val::Str(y))) => {
            // categories given on y: `sns.barplot(data=df, x="miles", y="day")`
            let horizontal = function == "barplot" && (oriented || is_text_column(data, y));
            if horizontal {
                return Ok((column_cells(data, y)?, column_numbers(data, x)?, true));
            }
            Ok((column_cells(data, x)?, column_numbers(data, y)?, false))
        }
        (_, Some(x), Some(y)) if is_list_like(x) && is_list_like(y) => {
            Ok((cells_of(x)?, numbers(y)?, oriented))
        }
        (Some(Val::Series(series)), None, None) => {
            Ok((series.index.clone(), series_numbers(series), oriented))
        }
        _ => raise(
            ExcKind::ValueError,
            format!("{}() could not interpret the x and y arguments", function),
        ),
    }
}

fn is_text_column(data: &Val, column: &str) -> bool {
    match data {
        Val::Frame(frame) => frame
            .column(column)
            .map(|c| c.values.iter().any(|v| matches!(v, Cell::Str(_))))
            .unwrap_or(false),
        _ => false,
    }
}

/// Mean of `ys` per distinct `xs`, in first-seen order
fn mean_by_key(xs: &[Cell], ys: &[f64]) -> (Vec<Cell>, Vec<f64>) {
    let mut keys: Vec<Cell> = Vec::new();
    let mut sums: Vec<(f64, usize)> = Vec::new();
    for (x, y) in xs.iter().zip(ys) {
        if x.is_missing() || !y.is_finite() {
            continue;
        }
        match keys.iter().position(|k| k == x) {
            Some(pos) => {
                sums[pos].0 += y;
                sums[pos].1 += 1;
            }
            None => {
                keys.push(x.clone());
                sums.push((*y, 1));
            }
        }
    }
    let means = sums.into_iter().map(|(sum, n)| sum / n as f64).collect();
    (keys, means)
}

fn palette_color(args: &Args) -> Option<Rgb> {
    match args.kw("palette") {
        Some(Val::List(colors)) => colors.borrow().first().and_then(|c| c.as_str().and_then(parse_color)),
        Some(Val::Str(name)) => parse_color(name),
        _ => None,
    }
}

/* ===================== pandas .plot ===================== */

/// `series.plot(kind=...)`, `series.plot.bar()`, `series.hist()`
pub fn plot_series(interp: &mut Interpreter, series: &Rc<Series>, kind: &str, args: &Args) -> EvalResult<Val> {
    let index = prepare_pandas_plot(interp, args)?;
    let ys = series_numbers(series);
    let mark = match kind {
        "hist" => hist_mark(&ys, args.usize_or(KW, "bins", 10)?, args)?,
        "box" | "boxplot" | "kde" | "density" | "pie" => return unsupported_chart(kind),
        other => {
            let mut mark = Mark::new(mark_kind(other)?, series.index.clone(), ys);
            style_mark(&mut mark, args)?;
            if mark.label.is_none() {
                mark.label = series.name.clone();
            }
            mark
        }
    };
    let handle = add_mark(interp, index, mark)?;
    label_pandas_plot(interp, index, args)?;
    Ok(handle)
}

/// `df.plot(x=..., y=..., kind=...)`, `df.plot.bar()`, `df.hist()`
pub fn plot_frame(interp: &mut Interpreter, frame: &Rc<DataFrame>, kind: &str, args: &Args) -> EvalResult<Val> {
    let index = prepare_pandas_plot(interp, args)?;
    let xs = match args.given(KW, "x") {
        Some(Val::Str(column)) => frame_column(frame, column)?.0,
        Some(other) => return raise(ExcKind::TypeError, format!("x must be a column label, not {}", other.type_name())),
        None => frame.index.clone(),
    };
    let x_name = args.str_opt(KW, "x")?;
    let y_columns: Vec<String> = match args.given(KW, "y").or_else(|| args.given(KW, "column")) {
        Some(Val::Str(column)) => vec![column.clone()],
        Some(list) if is_list_like(list) => super::names(list)?,
        Some(other) => return raise(ExcKind::TypeError, format!("y must be a column label, not {}", other.type_name())),
        None => frame
            .columns
            .iter()
            .filter(|c| Some(&c.name) != x_name.as_ref())
            .filter(|c| c.values.iter().any(Cell::is_numeric) && c.values.iter().all(|v| v.is_missing() || v.is_numeric()))
            .map(|c| c.name.clone())
            .collect(),
    };
    if kind == "scatter" && (x_name.is_none() || y_columns.len() != 1) {
        return raise(ExcKind::ValueError, "scatter requires an x and y column to plot");
    }
    let colors: Vec<Option<Rgb>> = match args.kw("color") {
        Some(Val::List(items)) => items.borrow().iter().map(|c| color_arg(Some(c))).collect(),
        _ => Vec::new(),
    };
    let mut handle = Val::Plot(PlotHandle::Axes(index));
    for (i, column) in y_columns.iter().enumerate() {
        let (_, ys) = frame_column(frame, column)?;
        let mut mark = match kind {
            "hist" => hist_mark(&ys, args.usize_or(KW, "bins", 10)?, &without_color(args, &colors))?,
            "box" | "boxplot" | "kde" | "density" | "pie" => return unsupported_chart(kind),
            other => {
                let mut mark = Mark::new(mark_kind(other)?, xs.clone(), ys);
                style_mark(&mut mark, &without_color(args, &colors))?;
                mark
            }
        };
        if let Some(Some(color)) = colors.get(i) {
            mark.color = Some(*color);
        }
        if mark.label.is_none() {
            mark.label = Some(column.clone());
        }
        handle = add_mark(interp, index, mark)?;
    }
    if y_columns.len() > 1 && !matches!(args.kw("legend"), Some(Val::Bool(false))) {
        interp.figure.panel_mut(index).legend = true;
    }
    label_pandas_plot(interp, index, args)?;
    if let (Some(x), None) = (x_name, args.kw("xlabel")) {
        let panel = interp.figure.panel_mut(index);
        if panel.xlabel.is_none() {
            panel.xlabel = Some(x);
        }
    }
    Ok(handle)
}

/// A per-column color list is applied separately from the shared keywords
fn without_color(args: &Args, colors: &[Option<Rgb>]) -> Args {
    if colors.is_empty() {
        return args.clone();
    }
    let mut out = args.clone();
    out.take_kw("color");
    out
}

fn mark_kind(kind: &str) -> EvalResult<MarkKind> {
    match kind {
        "line" | "plot" => Ok(MarkKind::Line),
        "bar" => Ok(MarkKind::Bar),
        "barh" => Ok(MarkKind::BarH),
        "scatter" => Ok(MarkKind::Scatter),
        "area" => Ok(MarkKind::Area { lower: Vec::new() }),
        other => raise(ExcKind::ValueError, format!("{} is not a valid plot kind", other)),
    }
}

/// `ax=` selects a panel; `figsize=` starts a new figure
fn prepare_pandas_plot(interp: &mut Interpreter, args: &Args) -> EvalResult<usize> {
    if let Some(Val::Plot(PlotHandle::Axes(i))) = args.kw("ax") {
        return Ok(*i);
    }
    if args.kw("figsize").is_some() {
        let (width, height) = figsize(args)?;
        fresh_figure(interp, width, height, 1, 1);
    }
    Ok(interp.figure.current)
}

fn label_pandas_plot(interp: &mut Interpreter, index: usize, args: &Args) -> EvalResult<()> {
    let title = args.given(KW, "title").map(Val::to_str);
    let xlabel = args.given(KW, "xlabel").map(Val::to_str);
    let ylabel = args.given(KW, "ylabel").map(Val::to_str);
    let grid = args.given(KW, "grid").map(Val::truthy).transpose()?;
    let dark = interp.dark_style;
    let panel = interp.figure.panel_mut(index);
    if title.is_some() {
        panel.title = title;
    }
    if xlabel.is_some() {
        panel.xlabel = xlabel;
    }
    if ylabel.is_some() {
        panel.ylabel = ylabel;
    }
    if grid == Some(true) {
        panel.grid = Some(if dark { DARK_GRID } else { Rgb([0xb0; 3]) });
    }
    Ok(())
}

/* ===================== Figures ===================== */

/// Replace the figure, carrying the dark style into the new one
fn fresh_figure(interp: &mut Interpreter, width: f64, height: f64, rows: usize, cols: usize) {
    let mut figure = Figure::new(width, height);
    figure.reset(width, height, rows, cols);
    if interp.dark_style {
        figure.facecolor = Some(Rgb::BLACK);
        for panel in &mut figure.panels {
            panel.facecolor = Some(DARK_FACE);
            panel.text_color = Some(Rgb::WHITE);
        }
    }
    interp.figure = figure;
}

fn apply_figure_face(interp: &mut Interpreter, args: &Args) {
    if let Some(color) = color_arg(args.kw("facecolor")) {
        interp.figure.facecolor = Some(color);
    }
}

fn figsize(args: &Args) -> EvalResult<(f64, f64)> {
    match args.kw("figsize") {
        Some(size) if is_list_like(size) => match numbers(size)?[..] {
            [w, h] if w > 0.0 && h > 0.0 => Ok((w, h)),
            _ => raise(ExcKind::ValueError, "figsize must be a pair of positive numbers"),
        },
        _ => Ok((6.4, 4.8)),
    }
}

/// `subplot(2, 1, 1)` or `subplot(211)`; the index is returned zero-based
fn subplot_position(args: &Args) -> EvalResult<(usize, usize, usize)> {
    match args.positional.as_slice() {
        [Val::Int(code)] if (111..=999).contains(code) => {
            let code = *code as usize;
            Ok((code / 100, (code / 10) % 10, (code % 10).max(1) - 1))
        }
        [rows, cols, index, ..] => {
            let rows = rows.as_i64().unwrap_or(1).max(1) as usize;
            let cols = cols.as_i64().unwrap_or(1).max(1) as usize;
            let index = index.as_i64().unwrap_or(1).max(1) as usize - 1;
            Ok((rows, cols, index))
        }
        _ => raise(ExcKind::TypeError, "subplot() takes 3 positional arguments or a three-digit integer"),
    }
}

/// The axes value returned by `subplots`: one handle, a list, or a list of rows
fn axes_grid(rows: usize, cols: usize) -> Val {
    let axes = |row: usize| (0..cols).map(move |col| Val::Plot(PlotHandle::Axes(row * cols + col)));
    match (rows, cols) {
        (1, 1) => Val::Plot(PlotHandle::Axes(0)),
        (1, _) => Val::list(axes(0).collect()),
        (_, 1) => Val::list((0..rows).map(|row| Val::Plot(PlotHandle::Axes(row))).collect()),
        _ => Val::list((0..rows).map(|row| Val::list(axes(row).collect())).collect()),
    }
}

fn savefig(interp: &mut Interpreter, args: &Args) -> EvalResult<Val> {
    if let Some(color) = color_arg(args.kw("facecolor")) {
        interp.figure.facecolor = Some(color);
    }
    if interp.figure.is_blank() {
        tracing::debug!("savefig on a blank figure, nothing saved");
        return Ok(Val::None);
    }
    match render_png(&interp.figure) {
        Ok(bytes) => {
            tracing::debug!(bytes = bytes.len(), "chart figure saved");
            interp.artifact = Some(bytes);
            Ok(Val::None)
        }
        Err(e) => raise(ExcKind::RuntimeError, format!("could not render figure: {}", e)),
    }
}

/* ===================== Values ===================== */

fn numbers(value: &Val) -> EvalResult<Vec<f64>> {
    if !is_list_like(value) {
        return Ok(vec![value.as_f64().unwrap_or(f64::NAN)]);
    }
    Ok(cells_of(value)?
        .iter()
        .map(|c| if c.is_missing() { f64::NAN } else { c.as_f64().unwrap_or(f64::NAN) })
        .collect())
}

fn series_numbers(series: &Series) -> Vec<f64> {
    series
        .values
        .iter()
        .map(|c| if c.is_missing() { f64::NAN } else { c.as_f64().unwrap_or(f64::NAN) })
        .collect()
}

/// x positions for `plot(y)`: the Series index, else 0..n
fn default_xs(y: &Val) -> EvalResult<Vec<Cell>> {
    match y {
        Val::Series(series) => Ok(series.index.clone()),
        other => Ok((0..cells_of(other)?.len() as i64).map(Cell::Int).collect()),
    }
}

fn frame_column(frame: &DataFrame, name: &str) -> EvalResult<(Vec<Cell>, Vec<f64>)> {
    match frame.column(name) {
        Some(column) => {
            let numbers = column
                .values
                .iter()
                .map(|c| if c.is_missing() { f64::NAN } else { c.as_f64().unwrap_or(f64::NAN) })
                .collect();
            Ok((column.values.clone(), numbers))
        }
        None => Err(crate::sandbox::types::Exception::key_error(name).into()),
    }
}

fn column_cells(data: &Val, column: &str) -> EvalResult<Vec<Cell>> {
    match data {
        Val::Frame(frame) => Ok(frame_column(frame, column)?.0),
        other => raise(
            ExcKind::TypeError,
            format!("data must be a DataFrame, not {}", other.type_name()),
        ),
    }
}

fn column_numbers(data: &Val, column: &str) -> EvalResult<Vec<f64>> {
    match data {
        Val::Frame(frame) => Ok(frame_column(frame, column)?.1),
        other => raise(
            ExcKind::TypeError,
            format!("data must be a DataFrame, not {}", other.type_name()),
        ),
    }
}

fn text_arg(args: &Args, index: usize, name: &str) -> EvalResult<String> {
    match args.get(index, name) {
        Some(Val::Str(text)) => Ok(text.clone()),
        Some(Val::None) | None => Ok(String::new()),
        Some(other @ (Val::Int(_) | Val::Float(_) | Val::Bool(_))) => match other.to_cell() {
            Some(cell) => Ok(label_text(&cell)),
            None => Ok(other.to_str()),
        },
        Some(other) => Ok(other.to_str()),
    }
}

fn color_arg(value: Option<&Val>) -> Option<Rgb> {
    match value? {
        Val::Str(text) => parse_color(text),
        Val::List(items) => items.borrow().first().and_then(|c| c.as_str().and_then(parse_color)),
        Val::Tuple(items) => {
            let channels: Vec<f64> = items.iter().filter_map(Val::as_f64).collect();
            match channels[..] {
                [r, g, b, ..] => {
                    let scale = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                    Some(Rgb([scale(r), scale(g), scale(b)]))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Color letter inside a matplotlib format string (`'r--'`, `'o-k'`)
fn format_color(fmt: &str) -> Option<Rgb> {
    fmt.chars()
        .find(|c| "bgrcmykw".contains(*c))
        .and_then(|c| parse_color(&c.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subplot_code_is_split() {
        let args = Args::new(vec![Val::Int(212)]);
        assert_eq!(subplot_position(&args).unwrap(), (2, 1, 1));
        let args = Args::new(vec![Val::Int(1), Val::Int(3), Val::Int(3)]);
        assert_eq!(subplot_position(&args).unwrap(), (1, 3, 2));
    }

    #[test]
    fn test_axes_grid_shapes() {
        match axes_grid(1, 1) {
            Val::Plot(PlotHandle::Axes(0)) => {}
            other => panic!("Expected single axes, got {:?}", other),
        }
        match axes_grid(2, 2) {
            Val::List(rows) => {
                assert_eq!(rows.borrow().len(), 2);
                match &rows.borrow()[1] {
                    Val::List(row) => match row.borrow()[0] {
                        Val::Plot(PlotHandle::Axes(i)) => assert_eq!(i, 2),
                        ref other => panic!("Expected axes, got {:?}", other),
                    },
                    other => panic!("Expected row list, got {:?}", other),
                }
            }
            other => panic!("Expected list of rows, got {:?}", other),
        }
    }

    #[test]
    fn test_mean_by_key_keeps_first_seen_order() {
        let xs = vec![Cell::Str("Tue".into()), Cell::Str("Mon".into()), Cell::Str("Tue".into())];
        let (keys, means) = mean_by_key(&xs, &[2.0, 5.0, 4.0]);
        assert_eq!(keys, vec![Cell::Str("Tue".into()), Cell::Str("Mon".into())]);
        assert_eq!(means, vec![3.0, 5.0]);
    }

    #[test]
    fn test_color_forms() {
        assert_eq!(color_arg(Some(&Val::str("#FC5200"))), Some(Rgb([0xfc, 0x52, 0x00])));
        let tuple = Val::tuple(vec![Val::Float(1.0), Val::Float(0.0), Val::Float(0.0)]);
        assert_eq!(color_arg(Some(&tuple)), Some(Rgb([255, 0, 0])));
        assert_eq!(format_color("r--"), parse_color("r"));
        assert_eq!(format_color("o-"), None);
    }

    #[test]
    fn test_hist_mark_uses_bin_centers() {
        let mark = hist_mark(&[0.0, 1.0, 2.0, 3.0, f64::NAN], 3, &Args::default()).unwrap();
        assert_eq!(mark.kind, MarkKind::Bar);
        assert_eq!(mark.ys, vec![1.0, 1.0, 2.0]);
        assert_eq!(mark.width, Some(1.0));
    }
}
