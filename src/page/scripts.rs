//! In-page scripts. Each is a WebDriver script body reading `arguments`.

/// Length of the rendered body text
pub const TEXT_LENGTH: &str = r#"
return document.body ? document.body.innerText.length : 0;
"#;

/// `document.readyState`
pub const READY_STATE: &str = r#"
return document.readyState;
"#;

/// Number of resource entries seen so far, used to detect network quiet
pub const RESOURCE_COUNT: &str = r#"
return (window.performance && performance.getEntriesByType)
  ? performance.getEntriesByType('resource').length
  : 0;
"#;

/// Force every collapsed `<details>` open. Returns the number opened.
pub const OPEN_DETAILS: &str = r#"
let n = 0;
document.querySelectorAll('details').forEach(d => { if (!d.open) { d.open = true; n++; } });
return n;
"#;

/// Click `aria-expanded="false"` elements and accordion toggles.
/// arguments: [accordionSelectors: string[], limit: number]
pub const OPEN_EXPANDERS: &str = r#"
const accordion = arguments[0].join(',');
const limit = arguments[1];
const sel = ['[aria-expanded="false"]', accordion].filter(Boolean).join(',');
let n = 0;
for (const el of Array.from(document.querySelectorAll(sel))) {
  if (n >= limit) break;
  if (!(el instanceof HTMLElement)) continue;
  if (el.getAttribute('aria-expanded') === 'false' || (accordion && el.matches(accordion))) {
    try { el.click(); n++; } catch (e) {}
  }
}
return n;
"#;

/// Remove overlay and backdrop nodes.
/// arguments: [selectors: string[], maxNodes: number]
pub const REMOVE_OVERLAYS: &str = r#"
const all = [];
for (const sel of arguments[0]) {
  try { all.push(...document.querySelectorAll(sel)); } catch (e) {}
}
let n = 0;
for (const el of all.slice(0, arguments[1])) {
  if (el && el.parentElement) { el.parentElement.removeChild(el); n++; }
}
return n;
"#;

/// Click "next" on every recognized carousel, a bounded number of times each.
/// arguments: [selectors: string[], maxClicksPerWidget: number]
pub const WALK_CAROUSELS: &str = r#"
const nexts = arguments[0].flatMap(sel => {
  try { return Array.from(document.querySelectorAll(sel)); } catch (e) { return []; }
});
const maxClicks = arguments[1];
return (async () => {
  let clicks = 0;
  for (const next of nexts) {
    if (!(next instanceof HTMLElement)) continue;
    for (let c = 0; c < maxClicks; c++) {
      next.click();
      clicks++;
      await new Promise(r => setTimeout(r, 150));
    }
  }
  return clicks;
})();
"#;

/// Scroll every element with real vertical overflow to its bottom.
/// arguments: [stepsPerContainer: number, maxContainers: number]
pub const SCROLL_OVERFLOWING: &str = r#"
const steps = arguments[0];
const maxc = arguments[1];
const isScrollable = (el) => {
  const s = getComputedStyle(el);
  return /(auto|scroll)/.test(s.overflowY || '') && el.scrollHeight > el.clientHeight + 20;
};
const els = Array.from(document.querySelectorAll('body *')).filter(isScrollable).slice(0, maxc);
return (async () => {
  let total = 0;
  for (const el of els) {
    for (let i = 0; i < steps; i++) {
      el.scrollTop = el.scrollHeight;
      total++;
      await new Promise(r => setTimeout(r, 150));
    }
  }
  return total;
})();
"#;

/// One whole-window scroll step towards the bottom
pub const SCROLL_WINDOW: &str = r#"
window.scrollBy(0, document.body ? document.body.scrollHeight : 0);
return 1;
"#;

/// Dispatch an Escape keydown/keyup on the focused element
pub const DISPATCH_ESCAPE: &str = r#"
const target = document.activeElement || document.body || document;
for (const type of ['keydown', 'keyup']) {
  target.dispatchEvent(new KeyboardEvent(type, { key: 'Escape', code: 'Escape', keyCode: 27, bubbles: true }));
}
return true;
"#;

/// Tag clickable candidates with `data-site-walker-candidate` and return their names.
/// arguments: [scope: "interactive" | "controls" | "links" | "any", maxCandidates: number]
pub const MARK_TEXT_CANDIDATES: &str = r#"
const scope = arguments[0];
const maxCandidates = arguments[1];
document.querySelectorAll('[data-site-walker-candidate]').forEach(el => el.removeAttribute('data-site-walker-candidate'));

const roleSel = 'a,button,summary,[role="tab"],[role="button"],[role="link"],input[type="button"],input[type="submit"]';
const textSel = 'span,div,p,li,label,strong,em,h2,h3,h4';
const navigates = (el) => {
  if (el.tagName !== 'A') return false;
  const href = (el.getAttribute('href') || '').trim();
  return href !== '' && !href.startsWith('#') && !href.toLowerCase().startsWith('javascript:');
};
const visible = (el) => {
  const r = el.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
};
const nameOf = (el) => {
  const label = el.getAttribute('aria-label') || el.getAttribute('title') || el.value || '';
  const text = (el.innerText || el.textContent || '').replace(/\s+/g, ' ').trim();
  return (label || text).slice(0, 200);
};
const ownText = (el) => Array.from(el.childNodes)
  .filter(n => n.nodeType === Node.TEXT_NODE)
  .map(n => n.textContent).join(' ').replace(/\s+/g, ' ').trim();

let pool = [];
if (scope === 'links') {
  pool = Array.from(document.querySelectorAll('a[href],[role="link"]'));
} else {
  pool = Array.from(document.querySelectorAll(roleSel));
  if (scope === 'controls') pool = pool.filter(el => !navigates(el));
  const plain = Array.from(document.querySelectorAll(textSel))
    .filter(el => ownText(el).length > 0 && ownText(el).length <= 80 && !el.closest('a[href]'));
  pool = pool.concat(plain);
}

const names = [];
for (const el of pool) {
  if (names.length >= maxCandidates) break;
  if (!visible(el)) continue;
  const name = el.matches(roleSel) ? nameOf(el) : ownText(el);
  if (!name) continue;
  el.setAttribute('data-site-walker-candidate', String(names.length));
  names.push(name);
}
return names;
"#;

/// `[width, height]` of the whole document
pub const DOCUMENT_SIZE: &str = r#"
const root = document.documentElement;
const body = document.body || root;
return [
  Math.max(root.scrollWidth, body.scrollWidth, root.clientWidth),
  Math.max(root.scrollHeight, body.scrollHeight, root.clientHeight),
];
"#;
