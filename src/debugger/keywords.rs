const IF_ELSE: &str =
    "if(condition) { ... } elif (condition) {} else {}: if-elif-else control flow. Curly braces {} are mandatory!";

static KEYWORDS: &[(&str, &str)] = &[
    ("if", IF_ELSE),
    ("elif", IF_ELSE),
    ("else", IF_ELSE),
    ("while", "while(condition) { ... }: While control flow. Curly braces {} are mandatory!"),
    ("for", "for(i : array) OR for(i=0; i<n; i++) { ... }: For control flow statements. Curly braces {} are mandatory!"),
    ("function", "function f(arg1, arg2, ...) { ... } : CSCS custom interpreted function (use cfunction for pre-compiled functions)"),
    ("cfunction", "cfunction <retType> f(<type1> arg1, <type2> arg2, ...) { ... } : CSCS function to be precompiled"),
    ("print", "Print(arg1, arg2, ...): Prints passed arguments to console"),
    ("write", "Write(arg1, arg2, ...): Prints passed arguments to console on the same line"),
    ("test", "Test(arg1, arg2): Tests if arg1 is equal to arg2"),
    ("isinteger", "IsInteger(arg): Tests if arg is an integer"),
    ("include", "include(filename): includes CSCS code from the filename"),
    ("substring", "Substring(arg, from, length): Returns a substring of arg"),
    ("pstime", "Returns process CPU time in milliseconds"),
    ("now", "Now(format='HH:mm:ss.fff'): Returns current date-time according to the format"),
    ("pow", "Pow(base, n): Returns base raised to the power of n"),
    ("exp", "Exp(x): Returns e (2.718281828...) raised to the power of x"),
    ("pi", "Pi: Pi constant (3.141592653589793...) "),
    ("sin", "Sin(x): Returns sine of x"),
    ("cos", "Cos(x): Returns cosine of x"),
    ("size", "Returns number of elements in a list or number of characters in a string"),
    ("type", "Returns variable type"),
    ("upper", "Converts to upper case"),
    ("lower", "Converts to lower case"),
    ("first", "Returns first element of a list or a first character of a string"),
    ("last", "Returns last element of a list or a last character of a string"),
    ("tokenize", "Returns list of tokens after separating the string according to a separator"),
    ("properties", "{Properties, Type, Size, String, First, Last, Upper, Lower}"),
];

/// Hover text for a built-in keyword or function. `name` must be lower case.
pub fn keyword_doc(name: &str) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == name)
        .map(|(_, doc)| *doc)
}
